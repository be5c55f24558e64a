use std::{
    sync::atomic::{AtomicI32, Ordering},
    time::Duration,
};

use async_trait::async_trait;

use teloxide::{prelude::*, types::AllowedUpdate};

use tgbot_core::{
    config::Config,
    dispatcher::UpdateSource,
    update::{Category, RawUpdate},
    Result,
};

use crate::{convert, map_err};

/// `getUpdates` long polling.
///
/// The offset advances past every update returned, so a batch is acknowledged by the
/// next fetch.
pub struct TelegramUpdateSource {
    bot: Bot,
    offset: AtomicI32,
    timeout_secs: u32,
    limit: u8,
    allowed_updates: Vec<AllowedUpdate>,
}

impl TelegramUpdateSource {
    pub fn new(bot: Bot) -> Self {
        Self::from_config(bot, &Config::default())
    }

    pub fn from_config(bot: Bot, cfg: &Config) -> Self {
        Self {
            bot,
            offset: AtomicI32::new(0),
            timeout_secs: secs(cfg.poll_timeout),
            limit: cfg.poll_limit,
            allowed_updates: cfg
                .allowed_updates
                .iter()
                .copied()
                .filter_map(convert::allowed_update)
                .collect(),
        }
    }

    pub fn allowed_updates(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.allowed_updates = categories
            .into_iter()
            .filter_map(convert::allowed_update)
            .collect();
        self
    }

    /// Next offset sent to Telegram.
    pub fn offset(&self) -> i32 {
        self.offset.load(Ordering::SeqCst)
    }

    fn advance(&self, updates: &[teloxide::types::Update]) {
        if let Some(last) = updates.iter().map(|u| u.id).max() {
            self.offset.fetch_max(last.saturating_add(1), Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl UpdateSource for TelegramUpdateSource {
    async fn next_batch(&self) -> Result<Vec<RawUpdate>> {
        let mut req = self
            .bot
            .get_updates()
            .offset(self.offset())
            .timeout(self.timeout_secs)
            .limit(self.limit);
        if !self.allowed_updates.is_empty() {
            req = req.allowed_updates(self.allowed_updates.clone());
        }

        let updates = req.await.map_err(map_err)?;
        self.advance(&updates);
        Ok(updates.into_iter().map(convert::raw_update).collect())
    }
}

fn secs(d: Duration) -> u32 {
    u32::try_from(d.as_secs()).unwrap_or(u32::MAX)
}
