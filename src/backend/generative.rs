//! HTTP backend for a Gemini-style `generateContent` API.
//!
//! Every call is a single-shot JSON request/response. Structured responses
//! are requested with an explicit response schema and validated strictly on
//! the way in: a missing field, an unparseable body, or an empty candidate
//! list is an error — partial shapes never leak downstream.

use crate::backend::{ContentGreeting, Direction, GreetingReply, LanguageBackend, TurnReply};
use crate::config::BackendConfig;
use crate::dialogue::state::{ContentItem, ContentSource, Message, ReplySuggestion, Sender};
use crate::error::{EngineError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on headlines returned per fetch.
const MAX_HEADLINES: usize = 3;

/// Generative-language backend over HTTP.
pub struct GenerativeBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

// ─── Response envelope ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

// ─── Structured payload shapes ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SuggestionDto {
    english: String,
    japanese: String,
}

impl From<SuggestionDto> for ReplySuggestion {
    fn from(dto: SuggestionDto) -> Self {
        Self {
            english: dto.english,
            japanese: dto.japanese,
        }
    }
}

/// Translation + suggestions for an already-generated English text.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GreetingDetailsDto {
    japanese_translation: String,
    reply_suggestions: Vec<SuggestionDto>,
}

/// The single structured per-turn reply.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnReplyDto {
    english_response: String,
    japanese_translation: String,
    reply_suggestions: Vec<SuggestionDto>,
    trigger_search: bool,
}

/// Search-grounded article before translation.
#[derive(Debug, Deserialize)]
struct ArticleDto {
    title: String,
    summary: String,
    uri: String,
}

/// Article with both language pairs populated.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BilingualArticleDto {
    title: String,
    summary: String,
    uri: String,
    japanese_title: String,
    japanese_summary: String,
}

impl From<BilingualArticleDto> for ContentItem {
    fn from(dto: BilingualArticleDto) -> Self {
        Self {
            title: dto.title,
            summary: dto.summary,
            uri: dto.uri,
            japanese_title: dto.japanese_title,
            japanese_summary: dto.japanese_summary,
        }
    }
}

impl GenerativeBackend {
    /// Create a backend client for the given API key and configuration.
    pub fn new(api_key: &str, config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "HTTP client build failed — continuing without the configured timeout");
                reqwest::Client::new()
            });

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key: api_key.to_owned(),
        }
    }

    /// POST a `generateContent` request and return the concatenated
    /// candidate text.
    async fn generate(&self, body: serde_json::Value) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Backend(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Backend(format!("HTTP {status}")));
        }

        let envelope: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Schema(format!("invalid response envelope: {e}")))?;

        let text: String = envelope
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(EngineError::Schema("empty response text".to_owned()));
        }
        Ok(text)
    }

    /// Second-step call shared by the greeting flows: translate an English
    /// text and produce three bilingual reply suggestions.
    async fn greeting_details(&self, english: &str) -> Result<GreetingDetailsDto> {
        let prompt = format!(
            "For the following English text, provide its Japanese translation and three simple \
             English reply suggestions (each with its own Japanese translation). Your ENTIRE \
             output must be a single, valid JSON object with no extra text. English text: \
             \"{english}\""
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": greeting_details_schema(),
            },
        });
        let text = self.generate(body).await?;
        parse_structured(&text)
    }
}

#[async_trait::async_trait]
impl LanguageBackend for GenerativeBackend {
    async fn initial_greeting(&self, persona_instruction: &str) -> Result<GreetingReply> {
        // Step 1: free-form greeting in the persona's voice.
        let prompt = format!(
            "You are an AI English conversation partner with the persona \
             '{persona_instruction}'. Your task is to start a friendly, open-ended conversation. \
             Keep your entire response natural, engaging, and around 1-2 sentences. Do not ask \
             about the news."
        );
        let english = self
            .generate(json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            }))
            .await?
            .trim()
            .to_owned();

        // Step 2: translation + suggestions for it.
        let details = self.greeting_details(&english).await?;

        Ok(GreetingReply {
            english,
            japanese: details.japanese_translation,
            suggestions: details.reply_suggestions.into_iter().map(Into::into).collect(),
        })
    }

    async fn per_turn_reply(
        &self,
        history: &[Message],
        utterance: &str,
        persona_instruction: &str,
        topic_instruction: &str,
    ) -> Result<TurnReply> {
        let base_instruction = "Keep your responses natural and engaging (around 1-3 sentences). \
             Your entire output MUST be a single JSON object. Provide your English reply, its \
             Japanese translation, and three simple English phrase suggestions for how the user \
             could reply. For each suggestion, provide both the English phrase and its Japanese \
             translation. Also set triggerSearch to true only when fresh web-search results about \
             the user's message would clearly enrich the conversation.";
        let system_instruction =
            format!("{persona_instruction} {topic_instruction} {base_instruction}");

        let mut contents: Vec<serde_json::Value> = history
            .iter()
            .map(|m| {
                json!({
                    "role": match m.sender {
                        Sender::User => "user",
                        Sender::Ai => "model",
                    },
                    "parts": [{ "text": m.english_text }],
                })
            })
            .collect();
        contents.push(json!({ "role": "user", "parts": [{ "text": utterance }] }));

        let body = json!({
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "contents": contents,
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": turn_reply_schema(),
            },
        });

        let text = self.generate(body).await?;
        let dto: TurnReplyDto = parse_structured(&text)?;
        Ok(TurnReply {
            english: dto.english_response,
            japanese: dto.japanese_translation,
            suggestions: dto.reply_suggestions.into_iter().map(Into::into).collect(),
            trigger_search: dto.trigger_search,
        })
    }

    async fn topical_headlines(&self, topic_label: &str) -> Result<Vec<ContentItem>> {
        // Step 1: search-grounded article fetch. Grounded responses cannot
        // carry a response schema, so the JSON arrives (possibly fenced) in
        // plain text and is validated here.
        let prompt = format!(
            "Find three recent, interesting, and distinct news articles related to \
             '{topic_label}'.\nFor each article, provide its title, a one-sentence summary, and \
             the source URI from your search results.\nYour response MUST be a valid JSON array \
             of objects, with no other text, where each object has \"title\", \"summary\", and \
             \"uri\" keys."
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "tools": [{ "googleSearch": {} }],
        });
        let text = self.generate(body).await?;
        let articles: Vec<ArticleDto> = parse_structured(&text)?;
        if articles.is_empty() {
            return Ok(Vec::new());
        }
        let articles: Vec<ArticleDto> = articles.into_iter().take(MAX_HEADLINES).collect();

        // Step 2: add Japanese translations, schema-enforced.
        let input_json = serde_json::to_string(
            &articles
                .iter()
                .map(|a| json!({ "title": a.title, "summary": a.summary, "uri": a.uri }))
                .collect::<Vec<_>>(),
        )
        .map_err(|e| EngineError::Schema(e.to_string()))?;

        let prompt = format!(
            "For each news article object in the following JSON array, add a \"japaneseTitle\" \
             and a \"japaneseSummary\" field containing the Japanese translation of the \
             \"title\" and \"summary\" respectively. Return the entire array as a single, valid \
             JSON object with no extra text.\n\nInput JSON:\n{input_json}"
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": bilingual_article_list_schema(),
            },
        });
        let text = self.generate(body).await?;
        let bilingual: Vec<BilingualArticleDto> = parse_structured(&text)?;
        info!(count = bilingual.len(), topic = topic_label, "headlines fetched");
        Ok(bilingual.into_iter().map(Into::into).collect())
    }

    async fn greeting_for_content(
        &self,
        item: &ContentItem,
        persona_instruction: &str,
    ) -> Result<ContentGreeting> {
        let prompt = format!(
            "You are an AI English conversation partner with the persona \
             '{persona_instruction}'.\nSeamlessly transition the conversation to this news \
             article that the user has just selected:\nTitle: \"{}\"\nSummary: \"{}\"\nYour \
             task:\n1. Acknowledge the user's choice (e.g., \"Oh, that's an interesting \
             one.\").\n2. Ask an open-ended question to continue the conversation about it.\n\
             Keep your entire response natural, engaging, and around 1-3 sentences.",
            item.title, item.summary
        );
        let english = self
            .generate(json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            }))
            .await?
            .trim()
            .to_owned();

        let details = self.greeting_details(&english).await?;

        Ok(ContentGreeting {
            english,
            japanese: details.japanese_translation,
            suggestions: details.reply_suggestions.into_iter().map(Into::into).collect(),
            source: ContentSource {
                uri: item.uri.clone(),
                title: item.title.clone(),
            },
        })
    }

    async fn web_search(&self, query: &str) -> Result<Vec<ContentItem>> {
        let prompt = format!(
            "Find up to three recent, distinct web pages that add useful context to this \
             statement from an English learner: \"{query}\".\nFor each page, provide its title, \
             a one-sentence summary, and the source URI from your search results.\nYour response \
             MUST be a valid JSON array of objects, with no other text, where each object has \
             \"title\", \"summary\", and \"uri\" keys."
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "tools": [{ "googleSearch": {} }],
        });
        let text = self.generate(body).await?;
        let articles: Vec<ArticleDto> = parse_structured(&text)?;
        if articles.is_empty() {
            return Ok(Vec::new());
        }
        let articles: Vec<ArticleDto> = articles.into_iter().take(MAX_HEADLINES).collect();

        let input_json = serde_json::to_string(
            &articles
                .iter()
                .map(|a| json!({ "title": a.title, "summary": a.summary, "uri": a.uri }))
                .collect::<Vec<_>>(),
        )
        .map_err(|e| EngineError::Schema(e.to_string()))?;

        let prompt = format!(
            "For each result object in the following JSON array, add a \"japaneseTitle\" and a \
             \"japaneseSummary\" field containing the Japanese translation of the \"title\" and \
             \"summary\" respectively. Return the entire array as a single, valid JSON object \
             with no extra text.\n\nInput JSON:\n{input_json}"
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": bilingual_article_list_schema(),
            },
        });
        let text = self.generate(body).await?;
        let bilingual: Vec<BilingualArticleDto> = parse_structured(&text)?;
        Ok(bilingual.into_iter().map(Into::into).collect())
    }

    async fn translate(&self, text: &str, direction: Direction) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let prompt = match direction {
            Direction::JapaneseToEnglish => format!(
                "Translate the following Japanese text into a single, natural, fluent English \
                 phrase for a casual conversation. IMPORTANT: Provide ONLY the English \
                 translation, with no extra text, explanations, or quotation marks. Japanese \
                 text: \"{text}\""
            ),
            Direction::EnglishToJapanese => format!(
                "Translate the following English text into a single, natural Japanese sentence \
                 for a casual conversation. IMPORTANT: Provide ONLY the Japanese translation, \
                 with no extra text, explanations, or quotation marks. English text: \"{text}\""
            ),
        };
        let out = self
            .generate(json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            }))
            .await?;
        Ok(out.trim().to_owned())
    }
}

/// Parse a structured JSON payload, tolerating a markdown code fence around
/// it (search-grounded calls cannot enforce a response schema).
fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T> {
    let cleaned = strip_code_fence(text);
    serde_json::from_str(cleaned)
        .map_err(|e| EngineError::Schema(format!("malformed structured response: {e}")))
}

/// Strip a surrounding ```json … ``` or ``` … ``` fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest));
    body.map(str::trim).unwrap_or(trimmed)
}

// ─── Response schemas (enumerated required fields) ──────────────────────────

fn suggestion_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "english": { "type": "STRING" },
                "japanese": { "type": "STRING" },
            },
            "required": ["english", "japanese"],
        },
    })
}

fn greeting_details_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "japaneseTranslation": { "type": "STRING" },
            "replySuggestions": suggestion_schema(),
        },
        "required": ["japaneseTranslation", "replySuggestions"],
    })
}

fn turn_reply_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "englishResponse": { "type": "STRING" },
            "japaneseTranslation": { "type": "STRING" },
            "replySuggestions": suggestion_schema(),
            "triggerSearch": { "type": "BOOLEAN" },
        },
        "required": ["englishResponse", "japaneseTranslation", "replySuggestions", "triggerSearch"],
    })
}

fn bilingual_article_list_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING" },
                "summary": { "type": "STRING" },
                "uri": { "type": "STRING" },
                "japaneseTitle": { "type": "STRING" },
                "japaneseSummary": { "type": "STRING" },
            },
            "required": ["title", "summary", "uri", "japaneseTitle", "japaneseSummary"],
        },
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn strip_code_fence_handles_all_variants() {
        assert_eq!(strip_code_fence("[1,2]"), "[1,2]");
        assert_eq!(strip_code_fence("```json\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fence("```\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fence("  ```json\n{\"a\":1}\n```  "), "{\"a\":1}");
    }

    #[test]
    fn turn_reply_requires_every_field() {
        let missing_trigger = r#"{
            "englishResponse": "Nice!",
            "japaneseTranslation": "いいね！",
            "replySuggestions": []
        }"#;
        assert!(parse_structured::<TurnReplyDto>(missing_trigger).is_err());

        let complete = r#"{
            "englishResponse": "Nice!",
            "japaneseTranslation": "いいね！",
            "replySuggestions": [{"english": "Thanks!", "japanese": "ありがとう！"}],
            "triggerSearch": true
        }"#;
        let dto = parse_structured::<TurnReplyDto>(complete).unwrap();
        assert!(dto.trigger_search);
        assert_eq!(dto.reply_suggestions.len(), 1);
    }

    #[test]
    fn fenced_article_array_parses() {
        let fenced = "```json\n[{\"title\":\"T\",\"summary\":\"S\",\"uri\":\"https://e.com\"}]\n```";
        let articles = parse_structured::<Vec<ArticleDto>>(fenced).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].uri, "https://e.com");
    }

    #[test]
    fn malformed_payload_is_a_schema_error() {
        let err = parse_structured::<Vec<ArticleDto>>("not json at all").unwrap_err();
        assert!(matches!(err, EngineError::Schema(_)));
    }
}
