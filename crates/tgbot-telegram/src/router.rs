use std::{sync::Arc, time::Duration};

use teloxide::prelude::*;

use tokio_util::sync::CancellationToken;

use tgbot_core::{config::Config, dispatcher::Dispatcher};

use crate::TelegramUpdateSource;

/// Headroom on top of the long-poll timeout before the HTTP client gives up.
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// A bot whose HTTP timeout outlasts the configured long-poll timeout.
pub fn build_bot(cfg: &Config) -> anyhow::Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(cfg.poll_timeout + HTTP_TIMEOUT_SLACK)
        .build()?;
    Ok(Bot::with_client(cfg.telegram_bot_token.clone(), client))
}

/// Long-poll Telegram into `dispatcher` until `cancel` fires.
pub async fn run_polling(
    cfg: Arc<Config>,
    bot: Bot,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "getMe failed; polling anyway"),
    }
    tracing::info!(
        storage = %cfg.storage_backend,
        max_concurrent_updates = cfg.max_concurrent_updates,
        allowed_updates = ?cfg.allowed_updates,
        "polling Telegram"
    );

    let source = Arc::new(TelegramUpdateSource::from_config(bot, &cfg));
    dispatcher.poll(source, cancel).await?;

    tracing::info!("bot stopped");
    Ok(())
}
