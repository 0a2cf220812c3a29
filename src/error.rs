//! Error types for the conversation assistant core.

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The generative-language backend returned an error or was unreachable.
    #[error("backend error: {0}")]
    Backend(String),

    /// A backend response did not match the expected shape.
    #[error("schema error: {0}")]
    Schema(String),

    /// Speech capture (streaming recognizer) error.
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech synthesis error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Preference storage error.
    #[error("store error: {0}")]
    Store(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EngineError>;
