//! Raw update feed model.
//!
//! Only the fields the dispatch engine and the built-in filters read are modelled here;
//! the full Telegram schema belongs to the adapter crate.

use chrono::{DateTime, Utc};

use crate::domain::{ChatId, MessageId, MessageRef, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Message {
    pub id: MessageId,
    pub date: DateTime<Utc>,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub caption: Option<String>,
}

impl Message {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef::new(self.chat.id, self.id)
    }

    /// Text, falling back to the media caption.
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

#[derive(Clone, Debug)]
pub struct InlineQuery {
    pub id: String,
    pub from: User,
    pub query: String,
    pub offset: String,
}

#[derive(Clone, Debug)]
pub struct ChosenInlineResult {
    pub result_id: String,
    pub from: User,
    pub inline_message_id: Option<String>,
    pub query: String,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub inline_message_id: Option<String>,
    pub data: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ShippingQuery {
    pub id: String,
    pub from: User,
    pub invoice_payload: String,
}

#[derive(Clone, Debug)]
pub struct PreCheckoutQuery {
    pub id: String,
    pub from: User,
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
}

/// One entry of the update feed. At most one payload field is populated.
///
/// `update_id` is used by the update source for offset tracking, never by the engine.
#[derive(Clone, Debug, Default)]
pub struct RawUpdate {
    pub update_id: i64,
    pub message: Option<Message>,
    pub edited_message: Option<Message>,
    pub channel_post: Option<Message>,
    pub edited_channel_post: Option<Message>,
    pub inline_query: Option<InlineQuery>,
    pub chosen_inline_result: Option<ChosenInlineResult>,
    pub callback_query: Option<CallbackQuery>,
    pub shipping_query: Option<ShippingQuery>,
    pub pre_checkout_query: Option<PreCheckoutQuery>,
}

/// Event categories, one handler registry each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Update,
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Update,
        Category::Message,
        Category::EditedMessage,
        Category::ChannelPost,
        Category::EditedChannelPost,
        Category::InlineQuery,
        Category::ChosenInlineResult,
        Category::CallbackQuery,
        Category::ShippingQuery,
        Category::PreCheckoutQuery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Update => "update",
            Category::Message => "message",
            Category::EditedMessage => "edited_message",
            Category::ChannelPost => "channel_post",
            Category::EditedChannelPost => "edited_channel_post",
            Category::InlineQuery => "inline_query",
            Category::ChosenInlineResult => "chosen_inline_result",
            Category::CallbackQuery => "callback_query",
            Category::ShippingQuery => "shipping_query",
            Category::PreCheckoutQuery => "pre_checkout_query",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The typed payload of one event.
#[derive(Clone, Debug)]
pub enum Payload {
    Update(RawUpdate),
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    InlineQuery(InlineQuery),
    ChosenInlineResult(ChosenInlineResult),
    CallbackQuery(CallbackQuery),
    ShippingQuery(ShippingQuery),
    PreCheckoutQuery(PreCheckoutQuery),
}

impl Payload {
    pub fn category(&self) -> Category {
        match self {
            Payload::Update(_) => Category::Update,
            Payload::Message(_) => Category::Message,
            Payload::EditedMessage(_) => Category::EditedMessage,
            Payload::ChannelPost(_) => Category::ChannelPost,
            Payload::EditedChannelPost(_) => Category::EditedChannelPost,
            Payload::InlineQuery(_) => Category::InlineQuery,
            Payload::ChosenInlineResult(_) => Category::ChosenInlineResult,
            Payload::CallbackQuery(_) => Category::CallbackQuery,
            Payload::ShippingQuery(_) => Category::ShippingQuery,
            Payload::PreCheckoutQuery(_) => Category::PreCheckoutQuery,
        }
    }

    /// Resolve the conversation identity `(chat, user)` this payload belongs to.
    ///
    /// Channel posts have no real user, so the chat id stands in for it.
    pub fn identity(&self) -> Option<(ChatId, UserId)> {
        match self {
            Payload::Update(update) => update.payload().and_then(|p| p.identity()),
            Payload::Message(m) | Payload::EditedMessage(m) => {
                let user = m.from.as_ref().map(|u| u.id).unwrap_or(UserId(m.chat.id.0));
                Some((m.chat.id, user))
            }
            Payload::ChannelPost(m) | Payload::EditedChannelPost(m) => {
                Some((m.chat.id, UserId(m.chat.id.0)))
            }
            Payload::InlineQuery(q) => Some(private_identity(&q.from)),
            Payload::ChosenInlineResult(r) => Some(private_identity(&r.from)),
            Payload::CallbackQuery(q) => {
                let chat = q
                    .message
                    .as_ref()
                    .map(|m| m.chat.id)
                    .unwrap_or(ChatId(q.from.id.0));
                Some((chat, q.from.id))
            }
            Payload::ShippingQuery(q) => Some(private_identity(&q.from)),
            Payload::PreCheckoutQuery(q) => Some(private_identity(&q.from)),
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            Payload::Message(m)
            | Payload::EditedMessage(m)
            | Payload::ChannelPost(m)
            | Payload::EditedChannelPost(m) => Some(m),
            Payload::CallbackQuery(q) => q.message.as_ref(),
            _ => None,
        }
    }

    /// The user who triggered this payload, if any.
    pub fn from(&self) -> Option<&User> {
        match self {
            Payload::Update(_) => None,
            Payload::Message(m) | Payload::EditedMessage(m) => m.from.as_ref(),
            Payload::ChannelPost(_) | Payload::EditedChannelPost(_) => None,
            Payload::InlineQuery(q) => Some(&q.from),
            Payload::ChosenInlineResult(r) => Some(&r.from),
            Payload::CallbackQuery(q) => Some(&q.from),
            Payload::ShippingQuery(q) => Some(&q.from),
            Payload::PreCheckoutQuery(q) => Some(&q.from),
        }
    }

    /// The user-supplied text this payload carries: message text (or caption),
    /// inline query text, or callback data.
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Message(m)
            | Payload::EditedMessage(m)
            | Payload::ChannelPost(m)
            | Payload::EditedChannelPost(m) => m.text_or_caption(),
            Payload::InlineQuery(q) => Some(q.query.as_str()),
            Payload::ChosenInlineResult(r) => Some(r.query.as_str()),
            Payload::CallbackQuery(q) => q.data.as_deref(),
            _ => None,
        }
    }
}

fn private_identity(user: &User) -> (ChatId, UserId) {
    (ChatId(user.id.0), user.id)
}

impl RawUpdate {
    /// The category of the populated payload field, inspected in a fixed priority order.
    pub fn kind(&self) -> Option<Category> {
        if self.message.is_some() {
            Some(Category::Message)
        } else if self.edited_message.is_some() {
            Some(Category::EditedMessage)
        } else if self.channel_post.is_some() {
            Some(Category::ChannelPost)
        } else if self.edited_channel_post.is_some() {
            Some(Category::EditedChannelPost)
        } else if self.inline_query.is_some() {
            Some(Category::InlineQuery)
        } else if self.chosen_inline_result.is_some() {
            Some(Category::ChosenInlineResult)
        } else if self.callback_query.is_some() {
            Some(Category::CallbackQuery)
        } else if self.shipping_query.is_some() {
            Some(Category::ShippingQuery)
        } else if self.pre_checkout_query.is_some() {
            Some(Category::PreCheckoutQuery)
        } else {
            None
        }
    }

    /// The populated payload (cloned), wrapped in its category variant.
    pub fn payload(&self) -> Option<Payload> {
        Some(match self.kind()? {
            Category::Message => Payload::Message(self.message.clone()?),
            Category::EditedMessage => Payload::EditedMessage(self.edited_message.clone()?),
            Category::ChannelPost => Payload::ChannelPost(self.channel_post.clone()?),
            Category::EditedChannelPost => {
                Payload::EditedChannelPost(self.edited_channel_post.clone()?)
            }
            Category::InlineQuery => Payload::InlineQuery(self.inline_query.clone()?),
            Category::ChosenInlineResult => {
                Payload::ChosenInlineResult(self.chosen_inline_result.clone()?)
            }
            Category::CallbackQuery => Payload::CallbackQuery(self.callback_query.clone()?),
            Category::ShippingQuery => Payload::ShippingQuery(self.shipping_query.clone()?),
            Category::PreCheckoutQuery => {
                Payload::PreCheckoutQuery(self.pre_checkout_query.clone()?)
            }
            Category::Update => return None,
        })
    }

    /// Split into its populated payload, consuming the update.
    pub fn into_payload(self) -> Option<Payload> {
        let RawUpdate {
            message,
            edited_message,
            channel_post,
            edited_channel_post,
            inline_query,
            chosen_inline_result,
            callback_query,
            shipping_query,
            pre_checkout_query,
            ..
        } = self;

        message
            .map(Payload::Message)
            .or_else(|| edited_message.map(Payload::EditedMessage))
            .or_else(|| channel_post.map(Payload::ChannelPost))
            .or_else(|| edited_channel_post.map(Payload::EditedChannelPost))
            .or_else(|| inline_query.map(Payload::InlineQuery))
            .or_else(|| chosen_inline_result.map(Payload::ChosenInlineResult))
            .or_else(|| callback_query.map(Payload::CallbackQuery))
            .or_else(|| shipping_query.map(Payload::ShippingQuery))
            .or_else(|| pre_checkout_query.map(Payload::PreCheckoutQuery))
    }
}
