use std::future::Future;

use tracing::{instrument::WithDispatch, instrument::WithSubscriber, Dispatch, Subscriber};

use crate::{Error, Result};

/// Initialize the process-wide tracing subscriber for the bot.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    // Default: info for our crates, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,tgbot=info,tgbot_core=info,tgbot_telegram=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))
}

/// Logging capability injected into the registries and the dispatcher.
///
/// Wraps a `tracing::Dispatch`: every log line the engine emits, including those from
/// tasks it spawns, goes to this dispatch instead of whatever happens to be the
/// thread's default.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// Logger bound to the dispatch that is current where this is called.
    pub fn current() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(|d| d.clone()),
        }
    }

    pub fn new<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        Self {
            dispatch: Dispatch::new(subscriber),
        }
    }

    /// Logger that discards everything.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    /// Run `f` with this logger as the default dispatch.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Bind `fut` to this logger for every poll.
    pub fn attach<F: Future>(&self, fut: F) -> WithDispatch<F> {
        fut.with_subscriber(self.dispatch.clone())
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::current()
    }
}

impl From<Dispatch> for Logger {
    fn from(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing_subscriber::fmt::MakeWriter;

    use super::Logger;

    /// In-memory log sink for asserting on what the engine logged.
    #[derive(Clone, Default)]
    pub struct CapturedLogs {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    pub struct CapturedWriter {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl io::Write for CapturedWriter {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedWriter;

        fn make_writer(&'a self) -> Self::Writer {
            CapturedWriter {
                buf: self.buf.clone(),
            }
        }
    }

    impl CapturedLogs {
        pub fn logger(&self) -> Logger {
            Logger::new(
                tracing_subscriber::fmt()
                    .with_writer(self.clone())
                    .with_ansi(false)
                    .with_max_level(tracing::Level::TRACE)
                    .finish(),
            )
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CapturedLogs;
    use super::*;

    #[test]
    fn in_scope_routes_to_injected_logger() {
        let logs = CapturedLogs::default();
        let logger = logs.logger();
        logger.in_scope(|| tracing::warn!(key = 7, "hello from scope"));
        let out = logs.contents();
        assert!(out.contains("hello from scope"), "{out}");
        assert!(out.contains("key=7"), "{out}");
    }

    #[tokio::test]
    async fn attach_routes_spawned_future() {
        let logs = CapturedLogs::default();
        let logger = logs.logger();
        tokio::spawn(logger.attach(async { tracing::info!("from a task") }))
            .await
            .unwrap();
        assert!(logs.contents().contains("from a task"));
    }

    #[test]
    fn disabled_logger_swallows_output() {
        let logs = CapturedLogs::default();
        Logger::disabled().in_scope(|| tracing::error!("dropped"));
        assert!(logs.contents().is_empty());
    }
}
