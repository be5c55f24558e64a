//! Demo handlers: a two-step form driven by the FSM, a callback ping, and an echo.

use std::sync::Arc;

use tgbot_core::{
    action_fn,
    filter::{CallbackData, ChatType, Command, StateFilter},
    Dispatcher, Event, Handler, Result, StateChain,
};

const FORM_STATES: [&str; 2] = ["form:name", "form:age"];

pub fn register(dp: &Dispatcher) -> Result<()> {
    let form = StateChain::new(FORM_STATES)?;

    dp.update().register(
        Handler::new(action_fn(|event| async move {
            tracing::debug!(category = %event.category(), "update received");
            Ok(())
        }))
        .named("trace"),
    );

    dp.message().register(
        Handler::new(action_fn(|event| async move {
            reply(&event, "Hi! Send /form to fill in a short form, or anything else to hear it back.")
                .await
        }))
        .named("start")
        .filter(Command::new("start")),
    );

    let chain = form.clone();
    dp.message().register(
        Handler::new(action_fn(move |event| {
            let chain = chain.clone();
            async move {
                let Some(fsm) = event.fsm() else {
                    return Ok(());
                };
                fsm.set_state(chain.first()).await?;
                reply(&event, "What is your name?").await
            }
        }))
        .named("form")
        .filter(Command::new("form")),
    );

    dp.message().register(
        Handler::new(action_fn(|event| async move {
            if let Some(fsm) = event.fsm() {
                fsm.finish().await?;
            }
            reply(&event, "Cancelled.").await
        }))
        .named("cancel")
        .filter(Command::new("cancel"))
        .filter(StateFilter::any()),
    );

    dp.message().register(
        Handler::new(action_fn(|event| async move {
            let Some(fsm) = event.fsm() else {
                return Ok(());
            };
            fsm.next().await?;
            let name = event.text().unwrap_or_default().trim().to_string();
            reply(&event, &format!("Nice to meet you, {name}. How old are you?")).await
        }))
        .named("form:name")
        .filter(StateFilter::is(FORM_STATES[0])),
    );

    dp.message().register(
        Handler::new(action_fn(|event| async move {
            let Some(fsm) = event.fsm() else {
                return Ok(());
            };
            let age = event.text().unwrap_or_default().trim();
            if age.parse::<u8>().is_err() {
                return reply(&event, "Please send your age as a number.").await;
            }
            // Last step: `next` finishes the conversation.
            fsm.next().await?;
            reply(&event, "Thanks, the form is complete.").await
        }))
        .named("form:age")
        .filter(StateFilter::is(FORM_STATES[1])),
    );

    dp.message().register(
        Handler::new(action_fn(|event| async move {
            let Some(text) = event.text() else {
                return Ok(());
            };
            reply(&event, text).await
        }))
        .named("echo")
        .filter(ChatType::private()),
    );

    dp.callback_query().register(
        Handler::new(action_fn(|event| async move {
            let Some(q) = event.callback_query() else {
                return Ok(());
            };
            event.bot().answer_callback_query(&q.id, Some("pong")).await?;
            // Inline-mode callbacks carry no message to edit.
            if let Some(origin) = &q.message {
                event.bot().edit_text(origin.message_ref(), "pong").await?;
            }
            Ok(())
        }))
        .named("ping")
        .filter(CallbackData::equals("ping")),
    );

    Ok(())
}

async fn reply(event: &Arc<Event>, text: &str) -> Result<()> {
    let Some(msg) = event.message() else {
        return Ok(());
    };
    event.bot().send_text(msg.chat.id, text).await?;
    Ok(())
}
