use async_trait::async_trait;
use tracing::warn;

use crate::{
    fsm::State,
    logging::Logger,
    storage::{Storage, StorageKey},
    Result,
};

/// Storage used when none is configured.
///
/// Reads always see no conversation; writes are dropped with a warning so a bot
/// without storage still runs, just without state.
#[derive(Debug, Default)]
pub struct NoopStorage {
    logger: Logger,
}

impl NoopStorage {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Storage for NoopStorage {
    async fn get_state(&self, _key: StorageKey) -> Result<Option<State>> {
        Ok(None)
    }

    async fn set_state(&self, key: StorageKey, state: Option<State>) -> Result<()> {
        self.logger.in_scope(|| {
            warn!(
                chat_id = key.chat_id.0,
                user_id = key.user_id.0,
                state = ?state,
                "state mutation requested but storage is disabled; configure a storage backend"
            )
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
