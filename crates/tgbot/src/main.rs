use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tgbot_core::{config::Config, storage, Dispatcher, DispatcherOptions, Logger};
use tgbot_telegram::{router, TelegramMessenger};

mod handlers;

#[tokio::main]
async fn main() -> Result<(), tgbot_core::Error> {
    tgbot_core::logging::init("tgbot")?;

    let cfg = Arc::new(Config::load()?);

    let bot = router::build_bot(&cfg)
        .map_err(|e| tgbot_core::Error::Config(format!("telegram client: {e}")))?;
    let storage = storage::open(cfg.storage_backend, Logger::current());
    let dispatcher = Dispatcher::new(Arc::new(TelegramMessenger::new(bot.clone())), storage)
        .options(DispatcherOptions::from(cfg.as_ref()));
    handlers::register(&dispatcher)?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    router::run_polling(cfg, bot, Arc::new(dispatcher), cancel)
        .await
        .map_err(|e| tgbot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c; stop the process to exit");
        return;
    }
    tracing::info!("shutting down; finishing in-flight updates");
    cancel.cancel();
}
