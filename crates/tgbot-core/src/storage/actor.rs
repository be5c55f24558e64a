use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    fsm::State,
    storage::{Storage, StorageKey, Transition},
    Error, Result,
};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum Request {
    Get {
        key: StorageKey,
        reply: oneshot::Sender<Option<State>>,
    },
    Set {
        key: StorageKey,
        state: Option<State>,
        reply: oneshot::Sender<()>,
    },
    Update {
        key: StorageKey,
        f: Transition,
        reply: oneshot::Sender<Option<State>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Storage owned by a single task that applies requests one at a time.
///
/// A request that made it into the queue is applied even if the caller stops waiting
/// for the reply; one that did not is never applied.
pub struct ActorStorage {
    tx: mpsc::Sender<Request>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl ActorStorage {
    /// Spawn the owning task on the current tokio runtime.
    pub fn spawn() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let actor = tokio::spawn(run_actor(rx));
        Self {
            tx,
            actor: Mutex::new(Some(actor)),
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }
}

fn closed() -> Error {
    Error::Storage("storage is closed".to_string())
}

async fn run_actor(mut rx: mpsc::Receiver<Request>) {
    let mut states: HashMap<StorageKey, State> = HashMap::new();

    while let Some(req) = rx.recv().await {
        match req {
            Request::Get { key, reply } => {
                let _ = reply.send(states.get(&key).cloned());
            }
            Request::Set { key, state, reply } => {
                match state {
                    Some(state) => {
                        states.insert(key, state);
                    }
                    None => {
                        states.remove(&key);
                    }
                }
                let _ = reply.send(());
            }
            Request::Update { key, f, reply } => {
                let next = f(states.get(&key).cloned());
                match &next {
                    Some(state) => states.insert(key, state.clone()),
                    None => states.remove(&key),
                };
                let _ = reply.send(next);
            }
            Request::Close { reply } => {
                rx.close();
                let _ = reply.send(());
                break;
            }
        }
    }
}

#[async_trait]
impl Storage for ActorStorage {
    async fn get_state(&self, key: StorageKey) -> Result<Option<State>> {
        self.request(|reply| Request::Get { key, reply }).await
    }

    async fn set_state(&self, key: StorageKey, state: Option<State>) -> Result<()> {
        self.request(|reply| Request::Set { key, state, reply })
            .await
    }

    async fn update_state(&self, key: StorageKey, f: Transition) -> Result<Option<State>> {
        self.request(|reply| Request::Update { key, f, reply }).await
    }

    async fn close(&self) -> Result<()> {
        // Already closed when the queue is gone.
        let _ = self.request(|reply| Request::Close { reply }).await;

        let actor = self.actor.lock().ok().and_then(|mut guard| guard.take());
        if let Some(actor) = actor {
            actor
                .await
                .map_err(|e| Error::Storage(format!("storage actor failed: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for ActorStorage {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.actor.lock() {
            if let Some(actor) = guard.take() {
                actor.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn round_trip_and_reset() {
        let storage = ActorStorage::spawn();
        let key = StorageKey::new(3, 4);

        storage.set_state(key, Some(State::new("S"))).await.unwrap();
        assert_eq!(storage.get_state(key).await.unwrap(), Some(State::new("S")));
        assert_eq!(storage.get_state(StorageKey::new(4, 3)).await.unwrap(), None);

        storage.reset_state(key).await.unwrap();
        assert_eq!(storage.get_state(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_state_applies_the_transition_in_place() {
        let storage = ActorStorage::spawn();
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
        let storage = Arc::new(ActorStorage::with_capacity(8));
        let key = StorageKey::new(1, 1);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..100 {
            let storage = storage.clone();
            tasks.spawn(async move {
                storage
                    .set_state(key, Some(State::new(format!("v{i}"))))
                    .await
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }

        let id = storage.get_state(key).await.unwrap().unwrap();
        let written: Vec<String> = (0..100).map(|i| format!("v{i}")).collect();
        assert!(written.iter().any(|w| w == id.id()));
    }

    #[tokio::test]
    async fn close_stops_the_actor_and_is_idempotent() {
        let storage = ActorStorage::spawn();
        storage
            .set_state(StorageKey::new(1, 1), Some(State::new("x")))
            .await
            .unwrap();

        storage.close().await.unwrap();
        storage.close().await.unwrap();

        assert!(matches!(
            storage.get_state(StorageKey::new(1, 1)).await,
            Err(Error::Storage(_))
        ));
    }
}
