//! teloxide types -> `tgbot_core::update` model.

use teloxide::types::{AllowedUpdate, Update, UpdateKind};

use tgbot_core::{
    domain::{ChatId, MessageId, UserId},
    update::{
        CallbackQuery, Category, Chat, ChatKind, ChosenInlineResult, InlineQuery, Message,
        PreCheckoutQuery, RawUpdate, ShippingQuery, User,
    },
};

/// Unsupported kinds (polls, chat member changes, ...) become an update with no payload,
/// which only the catch-all registry sees.
pub fn raw_update(update: Update) -> RawUpdate {
    let mut raw = RawUpdate {
        update_id: i64::from(update.id),
        ..Default::default()
    };

    match update.kind {
        UpdateKind::Message(m) => raw.message = Some(message(&m)),
        UpdateKind::EditedMessage(m) => raw.edited_message = Some(message(&m)),
        UpdateKind::ChannelPost(m) => raw.channel_post = Some(message(&m)),
        UpdateKind::EditedChannelPost(m) => raw.edited_channel_post = Some(message(&m)),
        UpdateKind::InlineQuery(q) => {
            raw.inline_query = Some(InlineQuery {
                id: q.id,
                from: user(&q.from),
                query: q.query,
                offset: q.offset,
            })
        }
        UpdateKind::ChosenInlineResult(r) => {
            raw.chosen_inline_result = Some(ChosenInlineResult {
                result_id: r.result_id,
                from: user(&r.from),
                inline_message_id: r.inline_message_id,
                query: r.query,
            })
        }
        UpdateKind::CallbackQuery(q) => {
            raw.callback_query = Some(CallbackQuery {
                from: user(&q.from),
                message: q.message.as_ref().map(message),
                inline_message_id: q.inline_message_id,
                data: q.data,
                id: q.id,
            })
        }
        UpdateKind::ShippingQuery(q) => {
            raw.shipping_query = Some(ShippingQuery {
                from: user(&q.from),
                invoice_payload: q.invoice_payload,
                id: q.id,
            })
        }
        UpdateKind::PreCheckoutQuery(q) => {
            raw.pre_checkout_query = Some(PreCheckoutQuery {
                from: user(&q.from),
                currency: format!("{:?}", q.currency),
                total_amount: i64::from(q.total_amount),
                invoice_payload: q.invoice_payload,
                id: q.id,
            })
        }
        other => {
            tracing::debug!(update_id = raw.update_id, kind = ?other, "unsupported update kind");
        }
    }

    raw
}

pub fn message(m: &teloxide::types::Message) -> Message {
    Message {
        id: MessageId(m.id.0),
        date: m.date,
        chat: chat(&m.chat),
        from: m.from().map(user),
        text: m.text().map(str::to_string),
        caption: m.caption().map(str::to_string),
    }
}

fn chat(c: &teloxide::types::Chat) -> Chat {
    let kind = if c.is_private() {
        ChatKind::Private
    } else if c.is_supergroup() {
        ChatKind::Supergroup
    } else if c.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    };
    Chat {
        id: ChatId(c.id.0),
        kind,
        title: c.title().map(str::to_string),
    }
}

fn user(u: &teloxide::types::User) -> User {
    User {
        id: UserId(u.id.0 as i64),
        is_bot: u.is_bot,
        first_name: u.first_name.clone(),
        username: u.username.clone(),
    }
}

/// `None` for the catch-all category, which is not a Telegram update type.
pub fn allowed_update(category: Category) -> Option<AllowedUpdate> {
    Some(match category {
        Category::Update => return None,
        Category::Message => AllowedUpdate::Message,
        Category::EditedMessage => AllowedUpdate::EditedMessage,
        Category::ChannelPost => AllowedUpdate::ChannelPost,
        Category::EditedChannelPost => AllowedUpdate::EditedChannelPost,
        Category::InlineQuery => AllowedUpdate::InlineQuery,
        Category::ChosenInlineResult => AllowedUpdate::ChosenInlineResult,
        Category::CallbackQuery => AllowedUpdate::CallbackQuery,
        Category::ShippingQuery => AllowedUpdate::ShippingQuery,
        Category::PreCheckoutQuery => AllowedUpdate::PreCheckoutQuery,
    })
}
