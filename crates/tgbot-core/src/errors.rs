/// Core error type for the dispatch engine.
///
/// Adapter crates should map their specific errors into this type so the engine
/// can tell a recoverable fault (logged, dispatch continues) from a cancellation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("filter error: {0}")]
    Filter(String),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("panicked: {0}")]
    Panicked(String),

    /// The operation was stopped on purpose. Never recovered by the engine.
    #[error("cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
