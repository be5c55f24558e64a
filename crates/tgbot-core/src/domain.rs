//! Identifiers shared by updates, storage keys and the bot handle.

/// Id of the user an update came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Id of a chat. Negative for groups and channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Id of a message, unique within its chat only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// Chat-qualified message id; what [`MessagingPort::edit_text`] targets.
///
/// [`MessagingPort::edit_text`]: crate::messaging::MessagingPort::edit_text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl MessageRef {
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}
