//! Conversation state storage.
//!
//! A [`Storage`] maps a (chat, user) identity to an optional [`State`]. Implementations
//! must give read-your-write consistency per identity under concurrent calls.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::StorageBackend,
    domain::{ChatId, UserId},
    fsm::State,
    logging::Logger,
    Error, Result,
};

mod actor;
mod memory;
mod noop;

pub use actor::ActorStorage;
pub use memory::MemoryStorage;
pub use noop::NoopStorage;

/// Composite key identifying one conversation slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

impl StorageKey {
    pub fn new(chat_id: i64, user_id: i64) -> Self {
        Self {
            chat_id: ChatId(chat_id),
            user_id: UserId(user_id),
        }
    }

    /// Resolve a key from a partial identity.
    ///
    /// A single id is used for both chat and user (private chat shorthand).
    pub fn resolve(chat_id: Option<i64>, user_id: Option<i64>) -> Result<Self> {
        match (chat_id, user_id) {
            (Some(chat), Some(user)) => Ok(Self::new(chat, user)),
            (Some(id), None) | (None, Some(id)) => Ok(Self::new(id, id)),
            (None, None) => Err(Error::InvalidArgument(
                "either chat_id or user_id is required".to_string(),
            )),
        }
    }
}

/// State change applied by [`Storage::update_state`].
pub type Transition = Box<dyn FnOnce(Option<State>) -> Option<State> + Send>;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_state(&self, key: StorageKey) -> Result<Option<State>>;

    async fn set_state(&self, key: StorageKey, state: Option<State>) -> Result<()>;

    /// Replace the state with `f(current)` and return the new state.
    ///
    /// The default is a plain read then write, so two concurrent updates of one key can
    /// both see the same current state. `MemoryStorage` and `ActorStorage` apply the
    /// transition with nothing interleaved.
    async fn update_state(&self, key: StorageKey, f: Transition) -> Result<Option<State>> {
        let next = f(self.get_state(key).await?);
        self.set_state(key, next.clone()).await?;
        Ok(next)
    }

    async fn reset_state(&self, key: StorageKey) -> Result<()> {
        self.set_state(key, None).await
    }

    /// Conversation teardown.
    async fn finish(&self, key: StorageKey) -> Result<()> {
        self.reset_state(key).await
    }

    /// Release resources. Idempotent; called once at shutdown.
    async fn close(&self) -> Result<()>;
}

/// Helpers that resolve a partial identity before touching storage.
#[async_trait]
pub trait StorageExt: Storage {
    async fn get_state_for(
        &self,
        chat_id: Option<i64>,
        user_id: Option<i64>,
    ) -> Result<Option<State>> {
        let key = StorageKey::resolve(chat_id, user_id)?;
        self.get_state(key).await
    }

    async fn set_state_for(
        &self,
        chat_id: Option<i64>,
        user_id: Option<i64>,
        state: Option<State>,
    ) -> Result<()> {
        let key = StorageKey::resolve(chat_id, user_id)?;
        self.set_state(key, state).await
    }

    async fn reset_state_for(&self, chat_id: Option<i64>, user_id: Option<i64>) -> Result<()> {
        let key = StorageKey::resolve(chat_id, user_id)?;
        self.reset_state(key).await
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

/// Build the configured backend. `Actor` spawns its task, so call this inside a runtime.
pub fn open(backend: StorageBackend, logger: Logger) -> Arc<dyn Storage> {
    match backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::Actor => Arc::new(ActorStorage::spawn()),
        StorageBackend::None => Arc::new(NoopStorage::new(logger)),
    }
}
