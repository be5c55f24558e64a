//! Core of the Telegram bot dispatch engine.
//!
//! Routes updates to handler registries, evaluates filters concurrently with
//! first-match selection, and keeps per-conversation FSM state behind a storage trait.
//! Telegram itself lives behind ports ([`UpdateSource`], [`MessagingPort`]) implemented
//! in adapter crates.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod event;
pub mod filter;
pub mod fsm;
pub mod handler;
pub mod logging;
pub mod messaging;
pub mod storage;
pub mod update;

pub use dispatcher::{Dispatcher, DispatcherOptions, UpdateSource};
pub use errors::{Error, Result};
pub use event::Event;
pub use filter::{Filter, FilterExt};
pub use fsm::{FsmContext, State, StateChain};
pub use handler::{action_fn, Action, Handler, Handlers};
pub use logging::Logger;
pub use messaging::MessagingPort;
pub use storage::{Storage, StorageExt, StorageKey, Transition};
pub use update::{Category, Payload, RawUpdate};
