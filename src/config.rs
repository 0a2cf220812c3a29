//! Configuration types for the conversation assistant.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the assistant core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Generative-language backend settings.
    pub backend: BackendConfig,
    /// Speech capture (streaming recognizer) settings.
    pub capture: CaptureConfig,
    /// Speech synthesis settings.
    pub synthesis: SynthesisConfig,
    /// Dialogue engine settings.
    pub conversation: ConversationConfig,
}

/// Generative-language backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// API key for the generative-language service.
    ///
    /// When `None` (or empty), the engine runs in the designed offline demo
    /// mode: every backend call short-circuits to fixed bilingual texts.
    pub api_key: Option<String>,
    /// Base URL of the generative-language service.
    pub base_url: String,
    /// Model identifier to request.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            model: "gemini-2.5-flash".to_owned(),
            timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    /// Return the configured API key, treating an empty string as absent.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// Speech capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// BCP-47 language tag for recognition.
    pub language: String,
    /// Silence window in ms after the last recognizer result before the
    /// utterance is considered finished and capture is force-stopped.
    pub silence_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_owned(),
            silence_timeout_ms: 800,
        }
    }
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Target language tag for synthesized speech.
    pub language: String,
    /// Ordered allow-list of known high-quality local voice names,
    /// matched case-insensitively against the platform voice inventory.
    pub preferred_voices: Vec<String>,
    /// Fixed pitch applied to every utterance.
    pub pitch: f32,
    /// Fixed volume applied to every utterance.
    pub volume: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_owned(),
            preferred_voices: vec![
                "Samantha".to_owned(),
                "Google US English".to_owned(),
                "Microsoft Zira - English (United States)".to_owned(),
                "Alex".to_owned(),
            ],
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// Dialogue engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Conversation length (greeting + turns) at which the topical-content
    /// selector is offered, provided headlines are available.
    pub topical_trigger_count: usize,
    /// Maximum number of headlines fetched per topic.
    pub max_headlines: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            topical_trigger_count: 6,
            max_headlines: 3,
        }
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::EngineError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::EngineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/eikaiwa/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(dir) = dirs::config_dir() {
            dir.join("eikaiwa").join("config.toml")
        } else {
            PathBuf::from("/tmp/eikaiwa-config/config.toml")
        }
    }
}
