use std::{fmt, sync::Arc, sync::OnceLock};

use crate::{
    fsm::FsmContext,
    messaging::MessagingPort,
    storage::{Storage, StorageKey},
    update::{CallbackQuery, Category, InlineQuery, Message, Payload, User},
};

/// One update payload travelling through a handler registry.
///
/// Holds shared references to the bot handle and the storage; the FSM context is
/// derived from the payload on first access and cached for the event's lifetime.
pub struct Event {
    payload: Payload,
    bot: Arc<dyn MessagingPort>,
    storage: Arc<dyn Storage>,
    fsm: OnceLock<Option<FsmContext>>,
}

impl Event {
    pub fn new(payload: Payload, bot: Arc<dyn MessagingPort>, storage: Arc<dyn Storage>) -> Self {
        Self {
            payload,
            bot,
            storage,
            fsm: OnceLock::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.payload.category()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn bot(&self) -> &Arc<dyn MessagingPort> {
        &self.bot
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// FSM context for the conversation this event belongs to, if it has an identity.
    pub fn fsm(&self) -> Option<&FsmContext> {
        self.fsm
            .get_or_init(|| {
                let (chat, user) = self.payload.identity()?;
                Some(FsmContext::new(
                    self.storage.clone(),
                    StorageKey {
                        chat_id: chat,
                        user_id: user,
                    },
                ))
            })
            .as_ref()
    }

    /// Message carried by this event (for callback queries, the originating message).
    pub fn message(&self) -> Option<&Message> {
        self.payload.message()
    }

    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        match &self.payload {
            Payload::CallbackQuery(q) => Some(q),
            Payload::Update(u) => u.callback_query.as_ref(),
            _ => None,
        }
    }

    pub fn inline_query(&self) -> Option<&InlineQuery> {
        match &self.payload {
            Payload::InlineQuery(q) => Some(q),
            Payload::Update(u) => u.inline_query.as_ref(),
            _ => None,
        }
    }

    pub fn from(&self) -> Option<&User> {
        self.payload.from()
    }

    pub fn text(&self) -> Option<&str> {
        self.payload.text()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::{
        fsm::State,
        storage::MemoryStorage,
        update::{fixtures, RawUpdate},
    };

    #[tokio::test]
    async fn fsm_context_is_derived_and_cached() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let event = event_with(
            Payload::Message(fixtures::private_message(11, "hi")),
            storage.clone(),
        );

        let ctx = event.fsm().unwrap();
        assert_eq!(ctx.key(), StorageKey::new(11, 11));
        assert!(std::ptr::eq(ctx, event.fsm().unwrap()));

        ctx.set_state(State::new("asked")).await.unwrap();
        assert_eq!(
            storage.get_state(StorageKey::new(11, 11)).await.unwrap(),
            Some(State::new("asked"))
        );
    }

    #[test]
    fn empty_update_has_no_fsm_context() {
        let event = event_with(
            Payload::Update(RawUpdate::default()),
            Arc::new(MemoryStorage::new()),
        );
        assert!(event.fsm().is_none());
        assert_eq!(event.category(), Category::Update);
    }

    #[test]
    fn accessors_expose_payload_fields() {
        let event = text_event(5, "/start");
        assert_eq!(event.text(), Some("/start"));
        assert_eq!(event.from().map(|u| u.id.0), Some(5));
        assert!(event.callback_query().is_none());
        assert_eq!(event.category(), Category::Message);
    }
}
