//! Offline demo backend used when no API key is configured.
//!
//! This is a designed degraded mode, not an error path: conversation calls
//! return fixed bilingual texts, content retrieval yields nothing, and
//! translation reports itself unavailable.

use crate::backend::{
    ContentGreeting, Direction, GreetingReply, LanguageBackend, TurnReply, fallback,
};
use crate::dialogue::state::{ContentItem, Message};
use crate::error::Result;

/// Backend stand-in for demo/offline mode.
pub struct OfflineBackend;

#[async_trait::async_trait]
impl LanguageBackend for OfflineBackend {
    async fn initial_greeting(&self, _persona_instruction: &str) -> Result<GreetingReply> {
        Ok(fallback::demo_greeting())
    }

    async fn per_turn_reply(
        &self,
        _history: &[Message],
        _utterance: &str,
        _persona_instruction: &str,
        _topic_instruction: &str,
    ) -> Result<TurnReply> {
        Ok(fallback::demo_turn_reply())
    }

    async fn topical_headlines(&self, _topic_label: &str) -> Result<Vec<ContentItem>> {
        Ok(Vec::new())
    }

    async fn greeting_for_content(
        &self,
        item: &ContentItem,
        _persona_instruction: &str,
    ) -> Result<ContentGreeting> {
        Ok(fallback::content_greeting_fallback(item))
    }

    async fn web_search(&self, _query: &str) -> Result<Vec<ContentItem>> {
        Ok(Vec::new())
    }

    async fn translate(&self, _text: &str, _direction: Direction) -> Result<String> {
        Ok(fallback::TRANSLATION_UNAVAILABLE.to_owned())
    }
}
