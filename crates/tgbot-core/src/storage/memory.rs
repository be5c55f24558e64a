use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    fsm::State,
    storage::{Storage, StorageKey, Transition},
    Error, Result,
};

/// In-process storage backed by a locked map.
///
/// Every operation holds the lock for a single read or write with no await in between,
/// so a cancelled `set_state` either applied fully or not at all.
#[derive(Debug)]
pub struct MemoryStorage {
    // `None` once closed.
    states: Mutex<Option<HashMap<StorageKey, State>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Number of identities with an active conversation.
    pub async fn len(&self) -> usize {
        self.states.lock().await.as_ref().map_or(0, HashMap::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn closed() -> Error {
    Error::Storage("storage is closed".to_string())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_state(&self, key: StorageKey) -> Result<Option<State>> {
        let states = self.states.lock().await;
        let states = states.as_ref().ok_or_else(closed)?;
        Ok(states.get(&key).cloned())
    }

    async fn set_state(&self, key: StorageKey, state: Option<State>) -> Result<()> {
        let mut states = self.states.lock().await;
        let states = states.as_mut().ok_or_else(closed)?;
        match state {
            Some(state) => {
                states.insert(key, state);
            }
            None => {
                states.remove(&key);
            }
        }
        Ok(())
    }

    async fn update_state(&self, key: StorageKey, f: Transition) -> Result<Option<State>> {
        let mut states = self.states.lock().await;
        let states = states.as_mut().ok_or_else(closed)?;
        let next = f(states.get(&key).cloned());
        match &next {
            Some(state) => states.insert(key, state.clone()),
            None => states.remove(&key),
        };
        Ok(next)
    }

    async fn close(&self) -> Result<()> {
        self.states.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn round_trip_and_reset() {
        let storage = MemoryStorage::new();
        let key = StorageKey::new(10, 20);

        storage.set_state(key, Some(State::new("S"))).await.unwrap();
        assert_eq!(storage.get_state(key).await.unwrap(), Some(State::new("S")));

        storage.reset_state(key).await.unwrap();
        assert_eq!(storage.get_state(key).await.unwrap(), None);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn finish_clears_state() {
        let storage = MemoryStorage::new();
        let key = StorageKey::new(1, 1);
        storage.set_state(key, Some(State::new("S"))).await.unwrap();
        storage.finish(key).await.unwrap();
        assert_eq!(storage.get_state(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_state_applies_the_transition_in_place() {
        let storage = MemoryStorage::new();
        let key = StorageKey::new(7, 7);

        let first = storage
            .update_state(key, Box::new(|s: Option<State>| s.or_else(|| Some(State::new("a")))))
            .await
            .unwrap();
        assert_eq!(first, Some(State::new("a")));
        assert_eq!(storage.get_state(key).await.unwrap(), Some(State::new("a")));

        let cleared = storage.update_state(key, Box::new(|_: Option<State>| None)).await.unwrap();
        assert_eq!(cleared, None);
        assert_eq!(storage.get_state(key).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_leave_one_written_value() {
        let storage = Arc::new(MemoryStorage::new());
        let key = StorageKey::new(1, 2);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..100 {
            let storage = storage.clone();
            tasks.spawn(async move {
                storage
                    .set_state(key, Some(State::new(format!("s{i}"))))
                    .await
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }

        let state = storage.get_state(key).await.unwrap().unwrap();
        let n: usize = state.id().trim_start_matches('s').parse().unwrap();
        assert!(n < 100);
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_later_calls() {
        let storage = MemoryStorage::new();
        storage.close().await.unwrap();
        storage.close().await.unwrap();
        assert!(matches!(
            storage.get_state(StorageKey::new(1, 1)).await,
            Err(Error::Storage(_))
        ));
        assert!(storage
            .set_state(StorageKey::new(1, 1), Some(State::new("x")))
            .await
            .is_err());
    }
}
