//! Persistent user preferences.
//!
//! A small TOML key-value store: speech playback rate, the autoplay
//! interaction gate, and user-defined persona/topic options. Absent files
//! and absent keys fall back to defaults; there is no schema versioning.

use crate::dialogue::persona::{CustomOption, OptionKind};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// The persisted preference set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Speech playback rate multiplier.
    pub speech_rate: f32,
    /// Whether the user has ever interacted (opens the autoplay gate).
    pub user_interacted: bool,
    /// User-defined personas.
    pub custom_personas: Vec<CustomOption>,
    /// User-defined topics.
    pub custom_topics: Vec<CustomOption>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            speech_rate: 0.9,
            user_interacted: false,
            custom_personas: Vec::new(),
            custom_topics: Vec::new(),
        }
    }
}

impl Preferences {
    /// Custom options for the given selector kind.
    pub fn custom_options(&self, kind: OptionKind) -> &[CustomOption] {
        match kind {
            OptionKind::Persona => &self.custom_personas,
            OptionKind::Topic => &self.custom_topics,
        }
    }

    fn custom_options_mut(&mut self, kind: OptionKind) -> &mut Vec<CustomOption> {
        match kind {
            OptionKind::Persona => &mut self.custom_personas,
            OptionKind::Topic => &mut self.custom_topics,
        }
    }
}

/// File-backed preference store.
pub struct PreferenceStore {
    path: PathBuf,
    prefs: Preferences,
}

impl PreferenceStore {
    /// Open the store at `path`. A missing or unreadable file yields
    /// defaults; corruption is logged, never fatal.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefs = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "unreadable preferences — using defaults");
                Preferences::default()
            }),
            Err(_) => Preferences::default(),
        };
        Self { path, prefs }
    }

    /// Open the store at the default path: `~/.config/eikaiwa/prefs.toml`.
    pub fn open_default() -> Self {
        Self::open(Self::default_path())
    }

    /// Default preference file path.
    pub fn default_path() -> PathBuf {
        if let Some(dir) = dirs::config_dir() {
            dir.join("eikaiwa").join("prefs.toml")
        } else {
            PathBuf::from("/tmp/eikaiwa-config/prefs.toml")
        }
    }

    /// The current preference values.
    pub fn get(&self) -> &Preferences {
        &self.prefs
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a mutation and persist the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn update(&mut self, apply: impl FnOnce(&mut Preferences)) -> Result<()> {
        apply(&mut self.prefs);
        self.save()
    }

    /// Add a custom option from free-form label text and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn add_custom_option(&mut self, kind: OptionKind, label: &str) -> Result<CustomOption> {
        let label = label.trim();
        if label.is_empty() {
            return Err(EngineError::Store("empty custom option label".to_owned()));
        }
        let option = CustomOption::from_label(label);
        self.prefs.custom_options_mut(kind).push(option.clone());
        self.save()?;
        Ok(option)
    }

    /// Delete a custom option by id and persist. Unknown ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn delete_custom_option(&mut self, kind: OptionKind, id: &str) -> Result<()> {
        self.prefs.custom_options_mut(kind).retain(|o| o.id != id);
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(&self.prefs).map_err(|e| EngineError::Store(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
