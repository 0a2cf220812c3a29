//! Eikaiwa: conversation orchestration core for a bilingual
//! English-practice assistant.
//!
//! The crate turns a generative-language backend into a strict
//! turn-sequenced conversation loop for Japanese speakers practicing
//! English:
//! - **Dialogue engine**: owns the message log, sequences turns, and
//!   injects retrieved content (news headlines, web-search results)
//! - **Backend**: six single-shot request/response shapes against the
//!   generative-language HTTP API, with an offline demo fallback
//! - **Capture**: push-to-talk speech input with silence endpointing
//! - **Synthesis**: serialized speech output with voice preference
//! - **Prefs**: persistent user preferences (rate, custom personas/topics)
//!
//! Presentation layers drive the engine through a [`DialogueHandle`] and
//! re-render from its [`UiEvent`] broadcast; nothing here draws a UI.

pub mod backend;
pub mod capture;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod prefs;
pub mod synthesis;

pub use config::AssistantConfig;
pub use dialogue::events::{UiEvent, UiIntent};
pub use dialogue::{DialogueEngine, DialogueHandle};
pub use error::{EngineError, Result};
pub use prefs::PreferenceStore;
