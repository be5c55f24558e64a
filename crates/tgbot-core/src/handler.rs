//! Handlers and the per-category handler registry.
//!
//! A [`Handler`] matches an event when every one of its filters passes. Filters of one
//! handler run concurrently and the first `false` aborts the rest. A [`Handlers`]
//! registry tests all of its handlers concurrently too, but always picks the earliest
//! registered match, so routing does not depend on filter latency.

use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, trace, warn};

use crate::{event::Event, filter::Filter, logging::Logger, update::Category, Error, Result};

/// What a handler does once it matched.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, event: Arc<Event>) -> Result<()>;
}

/// Closure action; see [`action_fn`].
pub struct ActionFn<F>(F);

/// Wrap an async closure taking the event.
pub fn action_fn<F, Fut>(f: F) -> ActionFn<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    ActionFn(f)
}

#[async_trait]
impl<F, Fut> Action for ActionFn<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn run(&self, event: Arc<Event>) -> Result<()> {
        (self.0)(event).await
    }
}

/// Ordered filters plus an action, optionally named for later unregistration.
pub struct Handler {
    name: Option<String>,
    filters: Vec<Arc<dyn Filter>>,
    action: Arc<dyn Action>,
}

impl Handler {
    pub fn new(action: impl Action + 'static) -> Self {
        Self {
            name: None,
            filters: Vec::new(),
            action: Arc::new(action),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Append already shared filters.
    pub fn filters(mut self, filters: impl IntoIterator<Item = Arc<dyn Filter>>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown")
    }

    /// True only if every filter passes.
    ///
    /// Each filter runs in its own task. The first `false` aborts the filters still
    /// running. A faulting filter is logged and counts as `false`, so it aborts the rest
    /// too. Dropping the returned future aborts every filter task.
    pub async fn test(&self, event: &Arc<Event>) -> Result<bool> {
        if self.filters.is_empty() {
            return Ok(true);
        }

        let logger = Logger::current();
        let mut tasks = JoinSet::new();
        for (idx, filter) in self.filters.iter().enumerate() {
            let filter = filter.clone();
            let event = event.clone();
            tasks.spawn(logger.attach(async move {
                (idx, catch_panic(async { filter.test(&event).await }).await)
            }));
        }

        while let Some(joined) = tasks.join_next().await {
            let (idx, outcome) = match joined {
                Ok(v) => v,
                Err(e) if e.is_cancelled() => return Err(Error::Cancelled),
                Err(e) => return Err(Error::Panicked(e.to_string())),
            };
            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    trace!(handler = self.display_name(), filter = idx, "filter rejected event");
                    return Ok(false);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(
                        handler = self.display_name(),
                        filter = idx,
                        error = %e,
                        "filter failed; treating it as not matched"
                    );
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}

/// Ordered handler collection for one event category.
///
/// Registration order is priority order. The list is copy-on-write: `notify` works on
/// a snapshot, so registering or unregistering never tears a list a dispatch is using.
pub struct Handlers {
    category: Category,
    handlers: RwLock<Arc<Vec<Arc<Handler>>>>,
    logger: Logger,
}

impl Handlers {
    pub fn new(category: Category, logger: Logger) -> Self {
        Self {
            category,
            handlers: RwLock::new(Arc::new(Vec::new())),
            logger,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Append a handler; it is tried after every handler registered before it.
    pub fn register(&self, handler: Handler) {
        let mut guard = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(Arc::new(handler));
        *guard = Arc::new(next);
    }

    /// Remove the first handler registered under `name`.
    pub fn unregister(&self, name: &str) -> bool {
        let mut guard = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = guard.iter().position(|h| h.name() == Some(name)) else {
            return false;
        };
        let mut next: Vec<Arc<Handler>> = guard.iter().cloned().collect();
        next.remove(pos);
        *guard = Arc::new(next);
        true
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Handler names in priority order (unnamed handlers are skipped).
    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .filter_map(|h| h.name().map(str::to_string))
            .collect()
    }

    fn snapshot(&self) -> Arc<Vec<Arc<Handler>>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run the first matching handler's action for `event`.
    ///
    /// Returns whether an action ran. Filter, test and action faults are logged and
    /// swallowed; only cancellation is returned as an error.
    pub async fn notify(&self, event: Arc<Event>) -> Result<bool> {
        self.logger.attach(self.notify_inner(event)).await
    }

    async fn notify_inner(&self, event: Arc<Event>) -> Result<bool> {
        let handlers = self.snapshot();
        if handlers.is_empty() {
            return Ok(false);
        }

        let Some(idx) = self.select(&handlers, &event).await? else {
            trace!(category = %self.category, "no handler matched");
            return Ok(false);
        };

        let handler = handlers[idx].clone();
        debug!(
            category = %self.category,
            handler = handler.display_name(),
            "handler matched"
        );

        match catch_panic(handler.action.run(event.clone())).await {
            Ok(()) => {}
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                error!(
                    category = %self.category,
                    handler = handler.display_name(),
                    event = ?event,
                    error = %e,
                    "handler action failed"
                );
            }
        }
        Ok(true)
    }

    /// Test every handler concurrently; the earliest registered `true` wins.
    async fn select(
        &self,
        handlers: &[Arc<Handler>],
        event: &Arc<Event>,
    ) -> Result<Option<usize>> {
        let mut tasks = JoinSet::new();
        for (idx, handler) in handlers.iter().enumerate() {
            let handler = handler.clone();
            let event = event.clone();
            tasks.spawn(self.logger.attach(async move {
                (idx, catch_panic(async { handler.test(&event).await }).await)
            }));
        }

        let mut resolved: Vec<Option<bool>> = vec![None; handlers.len()];
        while let Some(joined) = tasks.join_next().await {
            let (idx, outcome) = match joined {
                Ok(v) => v,
                Err(e) if e.is_cancelled() => return Err(Error::Cancelled),
                Err(e) => {
                    error!(category = %self.category, error = %e, "handler test task failed");
                    continue;
                }
            };

            let matched = match outcome {
                Ok(matched) => matched,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    error!(
                        category = %self.category,
                        handler = handlers[idx].display_name(),
                        error = %e,
                        "handler test failed; skipping handler"
                    );
                    false
                }
            };
            resolved[idx] = Some(matched);

            // Decided once every earlier handler is known not to match.
            match resolved.iter().position(|r| *r != Some(false)) {
                None => return Ok(None),
                Some(first) if resolved[first] == Some(true) => return Ok(Some(first)),
                Some(_) => {}
            }
        }

        // Only reachable when a test task died without reporting its index.
        Ok(resolved.iter().position(|r| *r == Some(true)))
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("category", &self.category)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

async fn catch_panic<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => Err(Error::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
