//! Dispatches a committed utterance to the external transcription service.
//!
//! Grounded on the teacher's `openai_cloud_fallback_text` helper (WAV wrap
//! + `reqwest` multipart + bearer auth), converted from a blocking call on
//! a dedicated pipeline thread to an async call on the session's own task,
//! since here a slow transcription must never block other sessions.

use std::time::Duration;

use reqwest::multipart;
use serde::Deserialize;

use crate::audio::wav::pcm_to_wav;
use crate::error::{GatewayError, Result};

/// Static, read-only-after-startup configuration for reaching the
/// external transcription service.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Outcome of one dispatch: either a transcript or a structured failure
/// reason, never a hard error — transport failures are reported as
/// `Err(GatewayError::Transcription)` so the caller can always turn the
/// result into a protocol event.
pub struct TranscriptionClient {
    http: reqwest::Client,
    config: DispatcherConfig,
}

impl TranscriptionClient {
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Other(e.into()))?;
        Ok(Self { http, config })
    }

    /// Wrap `samples` (16 kHz mono PCM16) in a WAV container, POST it to
    /// the transcription service, and return the transcript text.
    ///
    /// Never retried — a single failed attempt is surfaced to the caller,
    /// which emits `…transcription.failed` and moves on.
    pub async fn transcribe(&self, samples: &[i16], model: &str) -> Result<String> {
        let wav_bytes = pcm_to_wav(samples, 16_000);

        let file_part = multipart::Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| GatewayError::Transcription(format!("building multipart body: {e}")))?;

        let form = multipart::Form::new()
            .text("model", model.to_string())
            .part("file", file_part);

        let url = format!("{}/audio/transcriptions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::Transcription(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::Transcription(format!(
                "transcription service returned {}",
                response.status()
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transcription(format!("invalid response body: {e}")))?;

        if parsed.text.trim().is_empty() {
            return Err(GatewayError::Transcription(
                "transcription service returned empty text".to_string(),
            ));
        }

        Ok(parsed.text)
    }
}
