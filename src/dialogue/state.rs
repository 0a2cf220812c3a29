//! Conversation data model: messages, content items, and the aggregate state
//! owned by the dialogue engine.

use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The learner.
    User,
    /// The assistant.
    Ai,
}

impl Sender {
    /// Short tag used in message ids.
    fn tag(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }
}

/// Unique, ordering-friendly message identifier: `{sender}-{millis}-{seq}`.
///
/// The per-session sequence number breaks ties when two messages land within
/// the same millisecond, keeping ids monotonic in append order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A suggested reply the learner can use for the next turn, in both languages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySuggestion {
    /// The English phrase.
    pub english: String,
    /// Its Japanese translation.
    pub japanese: String,
}

/// Back-reference to the content item a message was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSource {
    /// Source URI.
    pub uri: String,
    /// Source title.
    pub title: String,
}

/// One conversational turn entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique id, monotonic in append order.
    pub id: MessageId,
    /// Message author.
    pub sender: Sender,
    /// Canonical-language (English) text.
    pub english_text: String,
    /// Japanese text. Present for every AI message (possibly a fixed
    /// fallback); attached asynchronously and best-effort for user messages.
    pub japanese_text: Option<String>,
    /// Reply scaffolding for the next user turn. AI messages only.
    pub reply_suggestions: Vec<ReplySuggestion>,
    /// Set when the message was generated from a selected content item.
    pub content_source: Option<ContentSource>,
}

/// A retrieved news headline or web-search snippet offered as a
/// conversation-steering option.
///
/// An item is only usable once both language pairs are populated; the
/// backend guarantees that by construction of its response schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// English title.
    pub title: String,
    /// One-sentence English summary.
    pub summary: String,
    /// Source URI.
    pub uri: String,
    /// Japanese translation of the title.
    pub japanese_title: String,
    /// Japanese translation of the summary.
    pub japanese_summary: String,
}

/// Where a candidate content list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOrigin {
    /// Topic-driven headline fetch.
    Topical,
    /// Background web search triggered by the per-turn reply.
    Search,
}

/// The aggregate conversation state, owned exclusively by the dialogue
/// engine. The presentation layer only ever sees snapshots.
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Ordered message log. Append-only; order is conversation order.
    pub messages: Vec<Message>,
    /// Current persona selector value.
    pub persona: String,
    /// Current topic selector value.
    pub topic: String,
    /// A per-turn reply request is outstanding.
    pub awaiting_reply: bool,
    /// A background web search is outstanding.
    pub awaiting_search: bool,
    /// Topical headline candidates for the current topic.
    pub headlines: Vec<ContentItem>,
    /// Web-search result candidates from the last triggered search.
    pub search_results: Vec<ContentItem>,
    /// Whether the topical selector is currently offered.
    pub topical_selector_visible: bool,
    /// Whether the search selector is currently offered.
    pub search_selector_visible: bool,
    /// The current headline batch has already had its one offer.
    pub topical_batch_consumed: bool,
    /// Monotonic per-session sequence for message ids.
    next_seq: u64,
}

impl ConversationState {
    /// Create an empty conversation with the given persona and topic.
    pub fn new(persona: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            persona: persona.into(),
            topic: topic.into(),
            awaiting_reply: false,
            awaiting_search: false,
            headlines: Vec::new(),
            search_results: Vec::new(),
            topical_selector_visible: false,
            search_selector_visible: false,
            topical_batch_consumed: false,
            next_seq: 0,
        }
    }

    /// Mint the next message id for `sender`.
    pub fn next_message_id(&mut self, sender: Sender) -> MessageId {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.next_seq;
        self.next_seq += 1;
        MessageId(format!("{}-{millis}-{seq}", sender.tag()))
    }

    /// Append a user message and return its id.
    pub fn push_user_message(&mut self, english_text: impl Into<String>) -> MessageId {
        let id = self.next_message_id(Sender::User);
        self.messages.push(Message {
            id: id.clone(),
            sender: Sender::User,
            english_text: english_text.into(),
            japanese_text: None,
            reply_suggestions: Vec::new(),
            content_source: None,
        });
        id
    }

    /// Append an AI message and return its id.
    pub fn push_ai_message(
        &mut self,
        english_text: impl Into<String>,
        japanese_text: impl Into<String>,
        reply_suggestions: Vec<ReplySuggestion>,
        content_source: Option<ContentSource>,
    ) -> MessageId {
        let id = self.next_message_id(Sender::Ai);
        self.messages.push(Message {
            id: id.clone(),
            sender: Sender::Ai,
            english_text: english_text.into(),
            japanese_text: Some(japanese_text.into()),
            reply_suggestions,
            content_source,
        });
        id
    }

    /// Pure reducer: return a copy of this state with the translation
    /// attached to exactly the message matching `id`.
    ///
    /// If no message matches (or the message already carries a translation)
    /// the state is returned unchanged — a late translation for a message
    /// that no longer needs one is dropped silently.
    #[must_use]
    pub fn with_translation(&self, id: &MessageId, japanese_text: &str) -> Self {
        let mut next = self.clone();
        if let Some(message) = next
            .messages
            .iter_mut()
            .find(|m| &m.id == id && m.japanese_text.is_none())
        {
            message.japanese_text = Some(japanese_text.to_owned());
        }
        next
    }

    /// Total number of messages in the log.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn message_ids_are_unique_and_ordered() {
        let mut state = ConversationState::new("standard", "business");
        let a = state.push_user_message("hello");
        let b = state.push_user_message("again");
        assert_ne!(a, b);
        assert!(a.0.starts_with("user-"));
        // Sequence suffix preserves append order even within one millisecond.
        assert!(a.0.ends_with("-0"));
        assert!(b.0.ends_with("-1"));
    }

    #[test]
    fn ai_messages_always_carry_japanese_text() {
        let mut state = ConversationState::new("standard", "business");
        state.push_ai_message("Hello!", "こんにちは！", Vec::new(), None);
        assert_eq!(
            state.messages[0].japanese_text.as_deref(),
            Some("こんにちは！")
        );
    }

    #[test]
    fn with_translation_patches_exactly_one_message() {
        let mut state = ConversationState::new("standard", "business");
        let first = state.push_user_message("good morning");
        state.push_user_message("good evening");

        let patched = state.with_translation(&first, "おはよう");
        assert_eq!(patched.messages[0].japanese_text.as_deref(), Some("おはよう"));
        assert!(patched.messages[1].japanese_text.is_none());
        // Original untouched.
        assert!(state.messages[0].japanese_text.is_none());
        // Order preserved.
        let ids: Vec<_> = patched.messages.iter().map(|m| m.id.clone()).collect();
        let orig: Vec<_> = state.messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, orig);
    }

    #[test]
    fn with_translation_unknown_id_is_noop() {
        let mut state = ConversationState::new("standard", "business");
        state.push_user_message("hi");
        let patched = state.with_translation(&MessageId("user-0-99".into()), "やあ");
        assert!(patched.messages[0].japanese_text.is_none());
    }

    #[test]
    fn with_translation_does_not_overwrite_existing() {
        let mut state = ConversationState::new("standard", "business");
        let id = state.push_user_message("hi");
        let once = state.with_translation(&id, "やあ");
        let twice = once.with_translation(&id, "こんにちは");
        assert_eq!(twice.messages[0].japanese_text.as_deref(), Some("やあ"));
    }
}
