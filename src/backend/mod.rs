//! Generative-language backend contract.
//!
//! Every orchestration-level call the dialogue engine makes is one of the
//! six request/response shapes on [`LanguageBackend`]. Implementations:
//! [`generative::GenerativeBackend`] (HTTP, strict response validation) and
//! [`offline::OfflineBackend`] (the designed demo/degraded mode used when no
//! API key is configured).

pub mod fallback;
pub mod generative;
pub mod offline;

use crate::config::BackendConfig;
use crate::dialogue::state::{ContentItem, ContentSource, Message, ReplySuggestion};
use crate::error::Result;
use std::sync::Arc;

/// Translation direction for [`LanguageBackend::translate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Japanese source → English output (composing user drafts).
    JapaneseToEnglish,
    /// English source → Japanese output (glossing utterances and replies).
    EnglishToJapanese,
}

/// A generated greeting: text in both languages plus reply scaffolding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingReply {
    /// English greeting text.
    pub english: String,
    /// Japanese translation.
    pub japanese: String,
    /// Suggested replies for the user's next turn.
    pub suggestions: Vec<ReplySuggestion>,
}

/// The structured per-turn reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// English reply text.
    pub english: String,
    /// Japanese translation.
    pub japanese: String,
    /// Suggested replies for the user's next turn.
    pub suggestions: Vec<ReplySuggestion>,
    /// The backend judged the user's utterance worth web augmentation.
    pub trigger_search: bool,
}

/// A greeting generated from a selected content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentGreeting {
    /// English greeting text.
    pub english: String,
    /// Japanese translation.
    pub japanese: String,
    /// Suggested replies for the user's next turn.
    pub suggestions: Vec<ReplySuggestion>,
    /// Back-reference to the item the greeting was generated from.
    pub source: ContentSource,
}

/// The generative-language service, reduced to six single-shot calls.
///
/// Implementations must validate response shapes strictly: a malformed or
/// partially-populated response is an error, never a half-filled value. The
/// dialogue engine converts every error into a designed degraded behavior
/// (fixed bilingual text or an empty list) at the call site.
#[async_trait::async_trait]
pub trait LanguageBackend: Send + Sync {
    /// Generate the conversation-opening greeting for the given persona.
    async fn initial_greeting(&self, persona_instruction: &str) -> Result<GreetingReply>;

    /// Generate the structured reply to `utterance`, given the full message
    /// history appended before this call was issued.
    async fn per_turn_reply(
        &self,
        history: &[Message],
        utterance: &str,
        persona_instruction: &str,
        topic_instruction: &str,
    ) -> Result<TurnReply>;

    /// Fetch up to three recent headlines for the topic, fully bilingual.
    async fn topical_headlines(&self, topic_label: &str) -> Result<Vec<ContentItem>>;

    /// Generate a conversation-steering greeting for a selected item.
    async fn greeting_for_content(
        &self,
        item: &ContentItem,
        persona_instruction: &str,
    ) -> Result<ContentGreeting>;

    /// Run a web search for content related to the user's utterance.
    async fn web_search(&self, query: &str) -> Result<Vec<ContentItem>>;

    /// Translate a single piece of text.
    async fn translate(&self, text: &str, direction: Direction) -> Result<String>;
}

/// Build the backend appropriate for `config`: the HTTP client when an API
/// key is present, otherwise the offline demo backend.
pub fn from_config(config: &BackendConfig) -> Arc<dyn LanguageBackend> {
    match config.effective_api_key() {
        Some(key) => {
            tracing::info!(model = config.model.as_str(), "backend configured");
            Arc::new(generative::GenerativeBackend::new(key, config))
        }
        None => {
            tracing::warn!("no API key configured — running in offline demo mode");
            Arc::new(offline::OfflineBackend)
        }
    }
}
