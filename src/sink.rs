//! Transcript delivery seam.
//!
//! The core calls exactly one registered sink after each successful
//! recognition. Within one source, calls arrive in flush order because a
//! single dispatcher owns that source; between sources there is no
//! ordering guarantee.

use std::sync::Mutex;

/// Pluggable consumer of transcription results.
pub trait TranscriptSink: Send + Sync {
    /// Handle one transcript. Called once per successfully recognized
    /// segment; must not block for long, it runs on the dispatcher worker.
    fn on_transcript(&self, source_tag: u32, transcript: &str, confidence: f32);

    /// Name for logging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Prints transcripts to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl TranscriptSink for StdoutSink {
    fn on_transcript(&self, source_tag: u32, transcript: &str, confidence: f32) {
        println!("[transcript] source {source_tag}: {transcript} (confidence: {confidence:.2})");
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Collects transcripts in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectorSink {
    received: Mutex<Vec<(u32, String, f32)>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<(u32, String, f32)> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.received().len()
    }

    pub fn is_empty(&self) -> bool {
        self.received().is_empty()
    }
}

impl TranscriptSink for CollectorSink {
    fn on_transcript(&self, source_tag: u32, transcript: &str, confidence: f32) {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((source_tag, transcript.to_string(), confidence));
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
