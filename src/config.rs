//! Configuration loading and validation.

use crate::defaults;
use crate::error::{Result, TablescribeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub speech: SpeechConfig,
    pub assistant: AssistantConfig,
}

/// Audio processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u8,
    /// Quiet time (ms) before a source's buffer is flushed for recognition.
    pub silence_threshold_ms: u64,
    /// Background silence detector scan period (ms).
    pub detector_tick_ms: u64,
    /// Per-source dispatch queue depth; full queue drops the batch.
    pub dispatch_queue_depth: usize,
    /// Where per-source archive recordings are written. `None` disables
    /// archiving entirely.
    pub recordings_dir: Option<PathBuf>,
    /// Where encoded segments that failed recognition are kept for
    /// offline inspection.
    pub diagnostics_dir: PathBuf,
}

/// Speech recognizer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    pub endpoint: String,
    pub api_key: String,
    pub language: String,
    pub model: String,
}

/// LLM assistant configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    /// Conversation messages kept before the oldest are trimmed.
    pub history_limit: usize,
    /// Where the conversation log is persisted between runs.
    pub conversation_path: PathBuf,
    /// Overrides the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            silence_threshold_ms: defaults::SILENCE_THRESHOLD.as_millis() as u64,
            detector_tick_ms: defaults::DETECTOR_TICK.as_millis() as u64,
            dispatch_queue_depth: defaults::DISPATCH_QUEUE_DEPTH,
            recordings_dir: Some(PathBuf::from("recordings")),
            diagnostics_dir: PathBuf::from("diagnostics"),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://speech.googleapis.com/v1/speech:recognize".to_string(),
            api_key: String::new(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            model: defaults::DEFAULT_SPEECH_MODEL.to_string(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: String::new(),
            model: defaults::DEFAULT_ASSISTANT_MODEL.to_string(),
            max_tokens: defaults::DEFAULT_MAX_TOKENS,
            history_limit: defaults::DEFAULT_HISTORY_LIMIT,
            conversation_path: PathBuf::from("conversation.json"),
            system_prompt: None,
        }
    }
}

impl AudioConfig {
    /// Silence threshold as a [`Duration`].
    pub fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_threshold_ms)
    }

    /// Detector tick period as a [`Duration`].
    pub fn detector_tick(&self) -> Duration {
        Duration::from_millis(self.detector_tick_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TablescribeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                TablescribeError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or fall back to defaults if the
    /// file does not exist. Invalid TOML still fails.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(TablescribeError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported:
    /// - `TABLESCRIBE_SPEECH_API_KEY` → speech.api_key
    /// - `TABLESCRIBE_ASSISTANT_API_KEY` → assistant.api_key
    /// - `TABLESCRIBE_LANGUAGE` → speech.language
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("TABLESCRIBE_SPEECH_API_KEY")
            && !key.is_empty()
        {
            self.speech.api_key = key;
        }

        if let Ok(key) = std::env::var("TABLESCRIBE_ASSISTANT_API_KEY")
            && !key.is_empty()
        {
            self.assistant.api_key = key;
        }

        if let Ok(language) = std::env::var("TABLESCRIBE_LANGUAGE")
            && !language.is_empty()
        {
            self.speech.language = language;
        }

        self
    }

    /// Validate configuration values that the pipeline depends on.
    fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(TablescribeError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.channels == 0 || self.audio.channels > 2 {
            return Err(TablescribeError::ConfigInvalidValue {
                key: "audio.channels".to_string(),
                message: "must be 1 or 2".to_string(),
            });
        }
        if self.audio.detector_tick_ms == 0 {
            return Err(TablescribeError::ConfigInvalidValue {
                key: "audio.detector_tick_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.detector_tick_ms >= self.audio.silence_threshold_ms {
            return Err(TablescribeError::ConfigInvalidValue {
                key: "audio.detector_tick_ms".to_string(),
                message: "must be shorter than silence_threshold_ms".to_string(),
            });
        }
        if self.audio.dispatch_queue_depth == 0 {
            return Err(TablescribeError::ConfigInvalidValue {
                key: "audio.dispatch_queue_depth".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
