//! Outbound messenger abstraction (the "bot handle" events carry).

pub mod port;

pub use port::MessagingPort;
