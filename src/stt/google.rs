//! Google-style HTTP speech recognizer.
//!
//! POSTs the encoded container (base64 in JSON) plus format metadata to a
//! `speech:recognize` endpoint and extracts transcript and confidence from
//! the first alternative of the first result.

use crate::config::SpeechConfig;
use crate::error::{Result, TablescribeError};
use crate::stt::recognizer::{AudioMetadata, Recognition, Recognizer};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct GoogleRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    encoding: String,
    sample_rate_hertz: u32,
    audio_channel_count: u8,
    language_code: String,
    model: String,
    enable_automatic_punctuation: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<SpeechAlternative>,
}

#[derive(Debug, Deserialize)]
struct SpeechAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

impl GoogleRecognizer {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn build_request(&self, audio: &[u8], metadata: &AudioMetadata) -> RecognizeRequest {
        RecognizeRequest {
            config: RecognitionConfig {
                encoding: metadata.encoding.clone(),
                sample_rate_hertz: metadata.sample_rate,
                audio_channel_count: metadata.channels,
                language_code: metadata.language.clone(),
                model: self.model.clone(),
                enable_automatic_punctuation: true,
            },
            audio: RecognitionAudio {
                content: BASE64.encode(audio),
            },
        }
    }
}

#[async_trait]
impl Recognizer for GoogleRecognizer {
    async fn recognize(&self, audio: &[u8], metadata: &AudioMetadata) -> Result<Recognition> {
        let request = self.build_request(audio, metadata);
        debug!(bytes = audio.len(), language = %metadata.language, "sending recognize request");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TablescribeError::RecognizeRequest {
                message: format!("status {status}: {body}"),
            });
        }

        let parsed: RecognizeResponse = response.json().await?;
        let alternative = parsed
            .results
            .into_iter()
            .next()
            .and_then(|r| r.alternatives.into_iter().next())
            .ok_or(TablescribeError::RecognizeEmpty)?;
        if alternative.transcript.is_empty() {
            return Err(TablescribeError::RecognizeEmpty);
        }

        Ok(Recognition {
            transcript: alternative.transcript,
            confidence: alternative.confidence,
        })
    }

    fn name(&self) -> &'static str {
        "google-speech"
    }
}
