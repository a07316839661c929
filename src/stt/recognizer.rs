//! Speech recognizer seam.
//!
//! The core hands an opaque encoded container plus format metadata to
//! whatever sits behind this trait and gets back a transcript with a
//! confidence score. Failure is opaque and non-retryable at this layer.

use crate::error::{Result, TablescribeError};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Format metadata sent alongside the encoded audio buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMetadata {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub language: String,
}

impl AudioMetadata {
    pub fn ogg_opus(sample_rate: u32, channels: u8, language: &str) -> Self {
        Self {
            encoding: "OGG_OPUS".to_string(),
            sample_rate,
            channels,
            language: language.to_string(),
        }
    }
}

/// One recognition outcome for a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub transcript: String,
    pub confidence: f32,
}

/// Trait for external speech recognition backends.
///
/// Allows swapping implementations (real HTTP API vs mock).
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize one self-contained encoded audio buffer.
    async fn recognize(&self, audio: &[u8], metadata: &AudioMetadata) -> Result<Recognition>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Mock recognizer for testing.
///
/// Records the byte length of every buffer it is handed so tests can
/// assert how often (and with what) it was called.
#[derive(Debug, Default)]
pub struct MockRecognizer {
    response: String,
    confidence: f32,
    should_fail: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<usize>>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            response: "mock transcript".to_string(),
            confidence: 0.9,
            should_fail: false,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Configure the mock to return a specific transcript.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Configure the mock to fail every call.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to stall each call, for backpressure tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of recognize calls seen so far.
    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    /// Byte lengths of the buffers received, in call order.
    pub fn received_sizes(&self) -> Vec<usize> {
        self.calls()
    }

    fn calls(&self) -> Vec<usize> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, audio: &[u8], _metadata: &AudioMetadata) -> Result<Recognition> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(audio.len());

        if self.should_fail {
            Err(TablescribeError::RecognizeRequest {
                message: "mock recognition failure".to_string(),
            })
        } else {
            Ok(Recognition {
                transcript: self.response.clone(),
                confidence: self.confidence,
            })
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
