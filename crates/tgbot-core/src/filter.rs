//! Async predicates deciding whether a handler runs for an event.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    event::Event,
    fsm::State,
    update::{ChatKind, Payload},
    Error, Result,
};

/// Predicate over an event.
///
/// May suspend (e.g. to consult storage). Must not mutate state. An `Err` is a fault:
/// the engine logs it and treats the filter as not passing.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn test(&self, event: &Event) -> Result<bool>;
}

#[async_trait]
impl<F: Filter + ?Sized> Filter for Arc<F> {
    async fn test(&self, event: &Event) -> Result<bool> {
        (**self).test(event).await
    }
}

#[async_trait]
impl<F: Filter + ?Sized> Filter for Box<F> {
    async fn test(&self, event: &Event) -> Result<bool> {
        (**self).test(event).await
    }
}

/// Synchronous closure filter; see [`filter_fn`].
pub struct FilterFn<F>(F);

/// Wrap a synchronous predicate.
pub fn filter_fn<F>(f: F) -> FilterFn<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    FilterFn(f)
}

#[async_trait]
impl<F> Filter for FilterFn<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    async fn test(&self, event: &Event) -> Result<bool> {
        Ok((self.0)(event))
    }
}

/// Matches `/name`, `/name args` and `/name@bot` in message text.
#[derive(Clone, Debug)]
pub struct Command {
    names: Vec<String>,
    bot_username: Option<String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self::any([name.into()])
    }

    pub fn any<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.into().trim_start_matches('/').to_string())
                .collect(),
            bot_username: None,
        }
    }

    /// Reject commands explicitly addressed to another bot.
    pub fn for_bot(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into().trim_start_matches('@').to_string());
        self
    }

    fn matches(&self, text: &str) -> bool {
        let Some(cmd) = text.split_whitespace().next() else {
            return false;
        };
        let Some(cmd) = cmd.strip_prefix('/') else {
            return false;
        };
        let (name, mention) = match cmd.split_once('@') {
            Some((name, bot)) => (name, Some(bot)),
            None => (cmd, None),
        };
        if let (Some(mention), Some(me)) = (mention, &self.bot_username) {
            if !mention.eq_ignore_ascii_case(me) {
                return false;
            }
        }
        self.names.iter().any(|n| n == name)
    }
}

#[async_trait]
impl Filter for Command {
    async fn test(&self, event: &Event) -> Result<bool> {
        let text = match event.payload() {
            Payload::Message(m) | Payload::EditedMessage(m) | Payload::ChannelPost(m) => {
                m.text.as_deref()
            }
            _ => None,
        };
        Ok(text.is_some_and(|t| self.matches(t)))
    }
}

#[derive(Clone, Debug)]
enum TextRule {
    Equals(String),
    Contains(String),
    StartsWith(String),
}

/// Plain text comparison against the event's text (message text or caption,
/// inline query, callback data).
#[derive(Clone, Debug)]
pub struct Text {
    rule: TextRule,
    ignore_case: bool,
}

impl Text {
    pub fn equals(s: impl Into<String>) -> Self {
        Self::with(TextRule::Equals(s.into()))
    }

    pub fn contains(s: impl Into<String>) -> Self {
        Self::with(TextRule::Contains(s.into()))
    }

    pub fn starts_with(s: impl Into<String>) -> Self {
        Self::with(TextRule::StartsWith(s.into()))
    }

    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    fn with(rule: TextRule) -> Self {
        Self {
            rule,
            ignore_case: false,
        }
    }

    fn matches(&self, text: &str) -> bool {
        let fold = |s: &str| {
            if self.ignore_case {
                s.to_lowercase()
            } else {
                s.to_string()
            }
        };
        let text = fold(text);
        match &self.rule {
            TextRule::Equals(s) => text == fold(s),
            TextRule::Contains(s) => text.contains(&fold(s)),
            TextRule::StartsWith(s) => text.starts_with(&fold(s)),
        }
    }
}

#[async_trait]
impl Filter for Text {
    async fn test(&self, event: &Event) -> Result<bool> {
        Ok(event.text().is_some_and(|t| self.matches(t)))
    }
}

/// Regular expression over the event's text.
#[derive(Clone, Debug)]
pub struct Pattern {
    re: regex::Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let re = regex::Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("invalid pattern {pattern:?}: {e}")))?;
        Ok(Self { re })
    }
}

#[async_trait]
impl Filter for Pattern {
    async fn test(&self, event: &Event) -> Result<bool> {
        Ok(event.text().is_some_and(|t| self.re.is_match(t)))
    }
}

/// Callback query data comparison.
#[derive(Clone, Debug)]
pub enum CallbackData {
    Equals(String),
    Prefix(String),
}

impl CallbackData {
    pub fn equals(s: impl Into<String>) -> Self {
        CallbackData::Equals(s.into())
    }

    pub fn prefix(s: impl Into<String>) -> Self {
        CallbackData::Prefix(s.into())
    }
}

#[async_trait]
impl Filter for CallbackData {
    async fn test(&self, event: &Event) -> Result<bool> {
        let Some(data) = event.callback_query().and_then(|q| q.data.as_deref()) else {
            return Ok(false);
        };
        Ok(match self {
            CallbackData::Equals(s) => data == s,
            CallbackData::Prefix(s) => data.starts_with(s.as_str()),
        })
    }
}

/// Kind of the chat the event's message lives in.
#[derive(Clone, Debug)]
pub struct ChatType {
    kinds: Vec<ChatKind>,
}

impl ChatType {
    pub fn private() -> Self {
        Self::any([ChatKind::Private])
    }

    /// Groups and supergroups.
    pub fn group() -> Self {
        Self::any([ChatKind::Group, ChatKind::Supergroup])
    }

    pub fn channel() -> Self {
        Self::any([ChatKind::Channel])
    }

    pub fn any(kinds: impl IntoIterator<Item = ChatKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Filter for ChatType {
    async fn test(&self, event: &Event) -> Result<bool> {
        Ok(event
            .message()
            .is_some_and(|m| self.kinds.contains(&m.chat.kind)))
    }
}

#[derive(Clone, Debug)]
enum StateRule {
    AnyOf(Vec<State>),
    Active,
    Inactive,
}

/// Matches on the conversation state of the event's identity, read from storage.
///
/// Events without an identity never match `is`/`any_of`/`any` and always match `none`.
#[derive(Clone, Debug)]
pub struct StateFilter {
    rule: StateRule,
}

impl StateFilter {
    pub fn is(state: impl Into<State>) -> Self {
        Self::any_of([state.into()])
    }

    pub fn any_of(states: impl IntoIterator<Item = State>) -> Self {
        Self {
            rule: StateRule::AnyOf(states.into_iter().collect()),
        }
    }

    /// Some conversation is active.
    pub fn any() -> Self {
        Self {
            rule: StateRule::Active,
        }
    }

    /// No conversation is active.
    pub fn none() -> Self {
        Self {
            rule: StateRule::Inactive,
        }
    }
}

#[async_trait]
impl Filter for StateFilter {
    async fn test(&self, event: &Event) -> Result<bool> {
        let current = match event.fsm() {
            Some(ctx) => ctx.get_state().await?,
            None => None,
        };
        Ok(match (&self.rule, current) {
            (StateRule::AnyOf(states), Some(cur)) => states.contains(&cur),
            (StateRule::AnyOf(_), None) => false,
            (StateRule::Active, cur) => cur.is_some(),
            (StateRule::Inactive, cur) => cur.is_none(),
        })
    }
}

/// Inverts a filter. A fault in the inner filter stays a fault.
pub struct Not<F>(pub F);

#[async_trait]
impl<F: Filter> Filter for Not<F> {
    async fn test(&self, event: &Event) -> Result<bool> {
        Ok(!self.0.test(event).await?)
    }
}

/// Passes when any member passes; members run in order and stop at the first pass.
pub struct AnyOf(pub Vec<Arc<dyn Filter>>);

#[async_trait]
impl Filter for AnyOf {
    async fn test(&self, event: &Event) -> Result<bool> {
        for f in &self.0 {
            if f.test(event).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub trait FilterExt: Filter + Sized + 'static {
    fn not(self) -> Not<Self> {
        Not(self)
    }

    fn or<G: Filter + 'static>(self, other: G) -> AnyOf {
        AnyOf(vec![Arc::new(self), Arc::new(other)])
    }
}

impl<F: Filter + Sized + 'static> FilterExt for F {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::testing::{event_with, text_event},
        storage::{MemoryStorage, Storage},
        update::fixtures,
    };

    #[tokio::test]
    async fn command_matches_name_args_and_mention() {
        let f = Command::new("start").for_bot("MyBot");
        assert!(f.test(&text_event(1, "/start")).await.unwrap());
        assert!(f.test(&text_event(1, "/start deep-link")).await.unwrap());
        assert!(f.test(&text_event(1, "/start@mybot")).await.unwrap());
        assert!(!f.test(&text_event(1, "/start@otherbot")).await.unwrap());
        assert!(!f.test(&text_event(1, "/stop")).await.unwrap());
        assert!(!f.test(&text_event(1, "start")).await.unwrap());
        assert!(!f.test(&text_event(1, "")).await.unwrap());
    }

    #[tokio::test]
    async fn command_aliases() {
        let f = Command::any(["/help", "h"]);
        assert!(f.test(&text_event(1, "/help")).await.unwrap());
        assert!(f.test(&text_event(1, "/h")).await.unwrap());
    }

    #[tokio::test]
    async fn text_rules() {
        let ev = text_event(1, "Hello World");
        assert!(Text::equals("Hello World").test(&ev).await.unwrap());
        assert!(!Text::equals("hello world").test(&ev).await.unwrap());
        assert!(Text::equals("hello world").ignore_case().test(&ev).await.unwrap());
        assert!(Text::contains("o W").test(&ev).await.unwrap());
        assert!(Text::starts_with("Hell").test(&ev).await.unwrap());
    }

    #[tokio::test]
    async fn pattern_filter() {
        let f = Pattern::new(r"^\d{3}$").unwrap();
        assert!(f.test(&text_event(1, "123")).await.unwrap());
        assert!(!f.test(&text_event(1, "12a")).await.unwrap());
        assert!(matches!(Pattern::new("("), Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn callback_data_and_chat_type() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let msg = fixtures::message_in(-1, ChatKind::Group, Some(1), "menu");
        let ev = event_with(
            Payload::CallbackQuery(fixtures::callback(1, "buy:42", Some(msg))),
            storage,
        );
        assert!(CallbackData::prefix("buy:").test(&ev).await.unwrap());
        assert!(!CallbackData::equals("buy").test(&ev).await.unwrap());
        assert!(ChatType::group().test(&ev).await.unwrap());
        assert!(!ChatType::private().test(&ev).await.unwrap());

        let ev = text_event(1, "hi");
        assert!(!CallbackData::prefix("").test(&ev).await.unwrap());
        assert!(ChatType::private().test(&ev).await.unwrap());
    }

    #[tokio::test]
    async fn state_filter_reads_storage() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let ev = event_with(
            Payload::Message(fixtures::private_message(8, "Bob")),
            storage.clone(),
        );

        assert!(StateFilter::none().test(&ev).await.unwrap());
        assert!(!StateFilter::any().test(&ev).await.unwrap());
        assert!(!StateFilter::is("name").test(&ev).await.unwrap());

        ev.fsm().unwrap().set_state(State::new("name")).await.unwrap();
        assert!(StateFilter::is("name").test(&ev).await.unwrap());
        assert!(StateFilter::any().test(&ev).await.unwrap());
        assert!(!StateFilter::none().test(&ev).await.unwrap());
        assert!(StateFilter::any_of([State::new("x"), State::new("name")])
            .test(&ev)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn combinators() {
        let ev = text_event(1, "/start");
        let start = Command::new("start");
        assert!(!start.clone().not().test(&ev).await.unwrap());
        assert!(Text::equals("nope").or(start).test(&ev).await.unwrap());
        assert!(filter_fn(|e| e.text() == Some("/start")).test(&ev).await.unwrap());

        let shared: Arc<dyn Filter> = Arc::new(Text::contains("start"));
        assert!(shared.test(&ev).await.unwrap());
    }

    #[tokio::test]
    async fn not_keeps_faults() {
        struct Broken;

        #[async_trait]
        impl Filter for Broken {
            async fn test(&self, _event: &Event) -> Result<bool> {
                Err(Error::Filter("boom".to_string()))
            }
        }

        assert!(Broken.not().test(&text_event(1, "x")).await.is_err());
    }
}
