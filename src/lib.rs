//! tablescribe - Live multi-speaker voice transcription assistant
//!
//! Ingests an interleaved Opus packet stream, buffers audio per speaker,
//! flushes on silence, and ships each segment to a speech recognizer. The
//! transcripts feed a persisted conversation log an LLM assistant can
//! answer questions against.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod assistant;
pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod sink;
pub mod stt;

// Core pipeline (source → segment → recognize)
pub use audio::{AudioPacket, AudioProcessor, FlushBatch, PacketClass, ProcessorConfig, ProcessorHandle};

// Traits at the seams
pub use sink::{CollectorSink, StdoutSink, TranscriptSink};
pub use stt::{AudioMetadata, MockRecognizer, Recognition, Recognizer};

// Assistant
pub use assistant::{ConversationLog, ConversationSink};

// Error handling
pub use error::{Result, TablescribeError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
