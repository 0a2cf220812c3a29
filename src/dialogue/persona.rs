//! Persona and topic selectors: built-in instruction tables plus
//! user-defined custom options.

use serde::{Deserialize, Serialize};

/// Built-in persona values and their system-instruction text.
const PERSONA_INSTRUCTIONS: &[(&str, &str)] = &[
    (
        "standard",
        "You are a friendly and encouraging English conversation partner for a Japanese speaker.",
    ),
    (
        "charismatic-sarcastic",
        "You are an English conversation partner for a Japanese speaker. Your persona is \
         'Charismatic and passionate, but with a sarcastic edge'.",
    ),
    (
        "calm-sharp",
        "You are an English conversation partner for a Japanese speaker. Your persona is \
         'Calm and intellectual, but with a sharp, biting wit'.",
    ),
    (
        "hyper-dark",
        "You are an English conversation partner for a Japanese speaker. Your persona is \
         'High-energy and cheerful, but loves to make dark jokes'.",
    ),
    (
        "easygoing-honest",
        "You are an English conversation partner for a Japanese speaker. Your persona is \
         'Easy-going and relaxed, but brutally and uncomfortably honest'.",
    ),
    (
        "hearty-direct",
        "You are an English conversation partner for a Japanese speaker. Your persona is \
         'Hearty, bold, and laughs loudly, with a very direct and unfiltered way of speaking'.",
    ),
];

/// Built-in topic values, display labels, and steering instructions.
const TOPIC_TABLE: &[(&str, &str, &str)] = &[
    (
        "world",
        "World & Politics",
        "You must try to steer the conversation towards topics related to World & Politics.",
    ),
    (
        "business",
        "Business & Economy",
        "You must try to steer the conversation towards topics related to Business & Economy.",
    ),
    (
        "science",
        "Science & Technology",
        "You must try to steer the conversation towards topics related to Science & Technology.",
    ),
    (
        "culture",
        "Culture & Lifestyle",
        "You must try to steer the conversation towards topics related to Culture & Lifestyle.",
    ),
    (
        "human",
        "Human Stories & Others",
        "You must try to steer the conversation towards topics related to Human Stories & Others.",
    ),
];

/// Which selector a custom option belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    /// AI persona.
    Persona,
    /// News/topic genre.
    Topic,
}

/// A user-defined persona or topic option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOption {
    /// Stable id (`custom-{millis}`).
    pub id: String,
    /// Selector value.
    pub value: String,
    /// Display label. For custom options this doubles as the instruction text.
    pub label: String,
}

impl CustomOption {
    /// Create a custom option from free-form label text.
    pub fn from_label(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: format!("custom-{}", chrono::Utc::now().timestamp_millis()),
            value: label.clone(),
            label,
        }
    }
}

/// Resolve the persona system-instruction for `value`.
///
/// Unknown built-ins fall back to `standard`; a matching custom option uses
/// its label text directly as the instruction.
pub fn persona_instruction<'a>(value: &'a str, custom: &'a [CustomOption]) -> &'a str {
    if let Some((_, instruction)) = PERSONA_INSTRUCTIONS.iter().find(|(v, _)| *v == value) {
        return instruction;
    }
    if let Some(option) = custom.iter().find(|o| o.value == value) {
        return &option.label;
    }
    PERSONA_INSTRUCTIONS[0].1
}

/// Resolve the topic steering instruction for `value`, if any.
///
/// Custom topics steer with their own label text; unknown values steer
/// nothing (empty instruction), matching the built-in behavior.
pub fn topic_instruction(value: &str, custom: &[CustomOption]) -> String {
    if let Some((_, _, instruction)) = TOPIC_TABLE.iter().find(|(v, _, _)| *v == value) {
        return (*instruction).to_owned();
    }
    if let Some(option) = custom.iter().find(|o| o.value == value) {
        return format!(
            "You must try to steer the conversation towards topics related to {}.",
            option.label
        );
    }
    String::new()
}

/// Resolve the human-readable topic label used in retrieval prompts.
pub fn topic_label<'a>(value: &'a str, custom: &'a [CustomOption]) -> &'a str {
    if let Some((_, label, _)) = TOPIC_TABLE.iter().find(|(v, _, _)| *v == value) {
        return label;
    }
    if let Some(option) = custom.iter().find(|o| o.value == value) {
        return &option.label;
    }
    value
}

/// Built-in persona values, in display order.
pub fn builtin_personas() -> impl Iterator<Item = &'static str> {
    PERSONA_INSTRUCTIONS.iter().map(|(v, _)| *v)
}

/// Built-in topic values, in display order.
pub fn builtin_topics() -> impl Iterator<Item = &'static str> {
    TOPIC_TABLE.iter().map(|(v, _, _)| *v)
}
