//! Update routing and the polling loop.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use tokio::{sync::Semaphore, task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    event::Event,
    handler::Handlers,
    logging::Logger,
    messaging::MessagingPort,
    storage::Storage,
    update::{Category, Payload, RawUpdate},
    Error, Result,
};

/// Feed of raw updates (long polling, webhook queue, ...).
///
/// Offset / acknowledgement tracking is the source's business.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn next_batch(&self) -> Result<Vec<RawUpdate>>;
}

#[derive(Clone, Copy, Debug)]
pub struct DispatcherOptions {
    /// Updates dispatched at the same time by `poll`.
    pub max_concurrent_updates: usize,
    /// Pause after a failed fetch before asking the source again.
    pub fetch_retry_delay: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            max_concurrent_updates: 64,
            fetch_retry_delay: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for DispatcherOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            max_concurrent_updates: cfg.max_concurrent_updates,
            fetch_retry_delay: cfg.fetch_retry_delay,
        }
    }
}

/// Owns one handler registry per update category and routes updates to them.
pub struct Dispatcher {
    bot: Arc<dyn MessagingPort>,
    storage: Arc<dyn Storage>,
    logger: Logger,
    options: DispatcherOptions,

    update: Handlers,
    message: Handlers,
    edited_message: Handlers,
    channel_post: Handlers,
    edited_channel_post: Handlers,
    inline_query: Handlers,
    chosen_inline_result: Handlers,
    callback_query: Handlers,
    shipping_query: Handlers,
    pre_checkout_query: Handlers,
}

impl Dispatcher {
    pub fn new(bot: Arc<dyn MessagingPort>, storage: Arc<dyn Storage>) -> Self {
        Self::with_logger(bot, storage, Logger::current())
    }

    pub fn with_logger(
        bot: Arc<dyn MessagingPort>,
        storage: Arc<dyn Storage>,
        logger: Logger,
    ) -> Self {
        let registry = |category| Handlers::new(category, logger.clone());
        Self {
            update: registry(Category::Update),
            message: registry(Category::Message),
            edited_message: registry(Category::EditedMessage),
            channel_post: registry(Category::ChannelPost),
            edited_channel_post: registry(Category::EditedChannelPost),
            inline_query: registry(Category::InlineQuery),
            chosen_inline_result: registry(Category::ChosenInlineResult),
            callback_query: registry(Category::CallbackQuery),
            shipping_query: registry(Category::ShippingQuery),
            pre_checkout_query: registry(Category::PreCheckoutQuery),
            bot,
            storage,
            logger,
            options: DispatcherOptions::default(),
        }
    }

    pub fn options(mut self, options: DispatcherOptions) -> Self {
        self.options = options;
        self
    }

    pub fn bot(&self) -> &Arc<dyn MessagingPort> {
        &self.bot
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn handlers(&self, category: Category) -> &Handlers {
        match category {
            Category::Update => &self.update,
            Category::Message => &self.message,
            Category::EditedMessage => &self.edited_message,
            Category::ChannelPost => &self.channel_post,
            Category::EditedChannelPost => &self.edited_channel_post,
            Category::InlineQuery => &self.inline_query,
            Category::ChosenInlineResult => &self.chosen_inline_result,
            Category::CallbackQuery => &self.callback_query,
            Category::ShippingQuery => &self.shipping_query,
            Category::PreCheckoutQuery => &self.pre_checkout_query,
        }
    }

    /// Catch-all registry; sees every update in addition to category routing.
    pub fn update(&self) -> &Handlers {
        &self.update
    }

    pub fn message(&self) -> &Handlers {
        &self.message
    }

    pub fn edited_message(&self) -> &Handlers {
        &self.edited_message
    }

    pub fn channel_post(&self) -> &Handlers {
        &self.channel_post
    }

    pub fn edited_channel_post(&self) -> &Handlers {
        &self.edited_channel_post
    }

    pub fn inline_query(&self) -> &Handlers {
        &self.inline_query
    }

    pub fn chosen_inline_result(&self) -> &Handlers {
        &self.chosen_inline_result
    }

    pub fn callback_query(&self) -> &Handlers {
        &self.callback_query
    }

    pub fn shipping_query(&self) -> &Handlers {
        &self.shipping_query
    }

    pub fn pre_checkout_query(&self) -> &Handlers {
        &self.pre_checkout_query
    }

    fn event(&self, payload: Payload) -> Arc<Event> {
        Arc::new(Event::new(payload, self.bot.clone(), self.storage.clone()))
    }

    /// Dispatch one update and wait for its handlers.
    ///
    /// The category registry and the catch-all registry are notified concurrently.
    pub async fn feed_update(&self, update: RawUpdate) -> Result<()> {
        self.logger.attach(self.route(update)).await
    }

    async fn route(&self, update: RawUpdate) -> Result<()> {
        let update_id = update.update_id;
        let catch_all = (!self.update.is_empty())
            .then(|| self.event(Payload::Update(update.clone())));
        let routed = update.into_payload().map(|p| self.event(p));

        if routed.is_none() {
            debug!(update_id, "update carries no supported payload");
        }

        let all = async {
            match catch_all {
                Some(event) => self.update.notify(event).await,
                None => Ok(false),
            }
        };
        let one = async {
            match routed {
                Some(event) => self.handlers(event.category()).notify(event).await,
                None => Ok(false),
            }
        };

        let (all, one) = tokio::join!(all, one);
        all?;
        one?;
        Ok(())
    }

    /// Pull updates from `source` and dispatch them until `cancel` fires.
    ///
    /// Fetch failures are logged and retried. After cancellation no new batch is
    /// fetched, updates already fetched are still dispatched and awaited, then the
    /// storage is closed. Dropping the returned future aborts every in-flight dispatch.
    pub async fn poll(
        self: Arc<Self>,
        source: Arc<dyn UpdateSource>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let logger = self.logger.clone();
        logger.attach(self.poll_inner(source, cancel)).await
    }

    async fn poll_inner(
        self: Arc<Self>,
        source: Arc<dyn UpdateSource>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.options.max_concurrent_updates.max(1)));
        let mut inflight: JoinSet<Result<()>> = JoinSet::new();
        let mut fetch: BoxFuture<'_, Result<Vec<RawUpdate>>> = source.next_batch();
        let mut outcome = Ok(());

        info!(
            max_concurrent_updates = self.options.max_concurrent_updates,
            "polling started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    log_dispatch(joined);
                }
                batch = &mut fetch => {
                    match batch {
                        Ok(updates) => {
                            if !updates.is_empty() {
                                debug!(count = updates.len(), "fetched updates");
                            }
                            for update in updates {
                                // Never closed, so acquiring only waits for a free slot.
                                let permit = permits
                                    .clone()
                                    .acquire_owned()
                                    .await
                                    .map_err(|_| Error::Cancelled)?;
                                let dispatcher = self.clone();
                                inflight.spawn(self.logger.attach(async move {
                                    let _permit = permit;
                                    dispatcher.feed_update(update).await
                                }));
                            }
                            fetch = source.next_batch();
                        }
                        Err(Error::Cancelled) => {
                            outcome = Err(Error::Cancelled);
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to fetch updates; retrying");
                            let delay = self.options.fetch_retry_delay;
                            let source = &source;
                            fetch = async move {
                                sleep(delay).await;
                                source.next_batch().await
                            }
                            .boxed();
                        }
                    }
                }
            }
        }

        drop(fetch);
        info!(in_flight = inflight.len(), "polling stopped; finishing in-flight updates");
        while let Some(joined) = inflight.join_next().await {
            log_dispatch(joined);
        }

        self.close().await?;
        outcome
    }

    /// Close the storage. Call once at shutdown when not using `poll`.
    pub async fn close(&self) -> Result<()> {
        self.storage.close().await
    }
}

fn log_dispatch(joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(Error::Cancelled)) => debug!("update dispatch cancelled"),
        Ok(Err(e)) => error!(error = %e, "update dispatch failed"),
        Err(e) if e.is_cancelled() => debug!("update dispatch aborted"),
        Err(e) => error!(error = %e, "update dispatch task panicked"),
    }
}
