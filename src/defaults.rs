//! Default constants for tablescribe.
//!
//! Shared between the configuration types and the audio pipeline so the
//! numbers live in exactly one place.

use std::time::Duration;

/// Sample rate of the live voice stream in Hz.
///
/// The upstream transport delivers Opus at 48kHz; the container encoder
/// stamps this into the OpusHead so the recognizer needs no side channel.
pub const SAMPLE_RATE: u32 = 48_000;

/// Channel count of the live voice stream.
pub const CHANNELS: u8 = 2;

/// Nominal duration of a single voice packet in milliseconds.
pub const PACKET_DURATION_MS: u32 = 20;

/// Samples per packet at [`SAMPLE_RATE`] (20ms frames).
pub const SAMPLES_PER_PACKET: u64 = 960;

/// The 3-byte payload the transport sends to explicitly signal silence.
///
/// A 3-byte voice payload that collides with this pattern is classified as
/// silence too; that false-silence risk is accepted rather than papered
/// over with heuristics.
pub const SILENCE_SENTINEL: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// How long a source must stay quiet before its buffered packets are
/// flushed to the recognizer.
pub const SILENCE_THRESHOLD: Duration = Duration::from_secs(2);

/// How often the background silence detector scans the session store.
///
/// Short relative to [`SILENCE_THRESHOLD`] so detection latency stays small
/// compared to the threshold itself.
pub const DETECTOR_TICK: Duration = Duration::from_millis(100);

/// Bounded depth of each per-source dispatch queue.
///
/// Submission never blocks; a full queue drops the batch and bumps a
/// counter instead of stalling live capture.
pub const DISPATCH_QUEUE_DEPTH: usize = 10;

/// Default language code sent to the recognizer.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Default recognition model identifier.
pub const DEFAULT_SPEECH_MODEL: &str = "latest_long";

/// Default assistant model identifier.
pub const DEFAULT_ASSISTANT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Default assistant completion budget.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default cap on persisted conversation messages before trimming.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;
