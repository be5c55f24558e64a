//! Conversation states and the per-identity FSM context.

use std::{fmt, sync::Arc};

use crate::{
    storage::{Storage, StorageKey},
    Error, Result,
};

/// One point in a conversation.
///
/// States built from a [`StateChain`] know their neighbours, so linear flows can step
/// with [`State::next`] / [`State::prev`]. Equality compares ids only.
#[derive(Clone)]
pub struct State {
    id: Arc<str>,
    chain: Option<(Arc<StateChain>, usize)>,
}

impl State {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            chain: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn next(&self) -> Option<State> {
        let (chain, idx) = self.chain.as_ref()?;
        chain.get(idx + 1)
    }

    pub fn prev(&self) -> Option<State> {
        let (chain, idx) = self.chain.as_ref()?;
        chain.get(idx.checked_sub(1)?)
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for State {}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("State").field(&self.id).finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for State {
    fn from(id: &str) -> Self {
        State::new(id)
    }
}

/// An ordered list of state ids forming a linear conversation.
#[derive(Debug)]
pub struct StateChain {
    ids: Vec<Arc<str>>,
}

impl StateChain {
    pub fn new<I, S>(ids: I) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let ids: Vec<Arc<str>> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Err(Error::InvalidArgument(
                "state chain needs at least one state".to_string(),
            ));
        }
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate state id in chain: {id}"
                )));
            }
        }
        Ok(Arc::new(Self { ids }))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn first(self: &Arc<Self>) -> State {
        // Non-empty by construction.
        self.state_at(0)
    }

    pub fn get(self: &Arc<Self>, idx: usize) -> Option<State> {
        (idx < self.ids.len()).then(|| self.state_at(idx))
    }

    /// Look a state up by id, keeping its position in the chain.
    pub fn find(self: &Arc<Self>, id: &str) -> Option<State> {
        let idx = self.ids.iter().position(|s| &**s == id)?;
        Some(self.state_at(idx))
    }

    fn state_at(self: &Arc<Self>, idx: usize) -> State {
        State {
            id: self.ids[idx].clone(),
            chain: Some((self.clone(), idx)),
        }
    }
}

/// Storage view bound to one conversation identity.
#[derive(Clone)]
pub struct FsmContext {
    storage: Arc<dyn Storage>,
    key: StorageKey,
}

impl FsmContext {
    pub fn new(storage: Arc<dyn Storage>, key: StorageKey) -> Self {
        Self { storage, key }
    }

    pub fn key(&self) -> StorageKey {
        self.key
    }

    pub async fn get_state(&self) -> Result<Option<State>> {
        self.storage.get_state(self.key).await
    }

    pub async fn set_state(&self, state: impl Into<Option<State>>) -> Result<()> {
        self.storage.set_state(self.key, state.into()).await
    }

    pub async fn reset_state(&self) -> Result<()> {
        self.storage.reset_state(self.key).await
    }

    pub async fn finish(&self) -> Result<()> {
        self.storage.finish(self.key).await
    }

    /// Move to the next state of the current chain. Clears the state when the current
    /// one is the last. Returns the new state.
    ///
    /// The step is a single [`Storage::update_state`] call, so concurrent steps on the
    /// same key never read the same state twice.
    pub async fn next(&self) -> Result<Option<State>> {
        self.storage
            .update_state(self.key, Box::new(|s: Option<State>| s.and_then(|s| s.next())))
            .await
    }

    /// Move to the previous state of the current chain; stays put on the first state.
    pub async fn prev(&self) -> Result<Option<State>> {
        self.storage
            .update_state(
                self.key,
                Box::new(|s: Option<State>| {
                    s.map(|current| current.prev().unwrap_or(current))
                }),
            )
            .await
    }
}

impl fmt::Debug for FsmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsmContext")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
