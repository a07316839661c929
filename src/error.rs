//! Error types for tablescribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TablescribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Container encoding errors
    #[error("Failed to open container for source {source_tag}: {message}")]
    ContainerOpen { source_tag: u32, message: String },

    #[error("Container write failed for source {source_tag}: {message}")]
    ContainerWrite { source_tag: u32, message: String },

    // Recognizer errors
    #[error("Recognition request failed: {message}")]
    RecognizeRequest { message: String },

    #[error("Recognizer returned no result")]
    RecognizeEmpty,

    // Assistant errors
    #[error("Assistant API error: {kind} - {message}")]
    AssistantApi { kind: String, message: String },

    #[error("Assistant returned an empty reply")]
    AssistantEmptyReply,

    #[error("Failed to persist conversation at {path}: {message}")]
    ConversationPersist { path: String, message: String },

    // Processing lifecycle errors
    #[error("Audio processing already started")]
    AlreadyProcessing,

    #[error("Audio processing is not running")]
    NotProcessing,

    // HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, TablescribeError>;
