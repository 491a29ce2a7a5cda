//! ASR (speech-to-text) HTTP client.
//!
//! Transcribing a long episode holds the response open for a long time, so
//! this client is built on a bespoke transport with multi-hour timeouts.
//! The platform default of a few minutes would silently cap any episode
//! beyond ~12 minutes of audio.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

/// Total request deadline: transcription of a multi-hour episode.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 3600);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct AsrJsonResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// A transcription result: plain text plus detected language when the
/// service reports one.
#[derive(Debug, Clone)]
pub struct AsrResult {
    pub text: String,
    pub language: Option<String>,
}

/// Client for `POST {host}/asr?output=txt` with multipart field `audio_file`.
#[derive(Debug, Clone)]
pub struct AsrClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl AsrClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build ASR HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Transcribe an audio file. The response is JSON `{text, language?}`
    /// when the service supports it, otherwise plain text.
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<AsrResult> {
        let url = format!("{}/asr?output=txt", self.base_url);
        let size = audio.len();
        info!(url = %url, bytes = size, filename = %filename, "submitting audio for transcription");

        let part = Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .context("invalid mime type")?;
        let form = Form::new().part("audio_file", part);

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("ASR request failed")?;

        let status = response.status();
        let body = response.text().await.context("failed to read ASR response")?;
        if !status.is_success() {
            anyhow::bail!("ASR service returned HTTP {status}: {body}");
        }

        debug!(chars = body.len(), "transcription received");
        Ok(parse_asr_response(&body))
    }
}

/// JSON first, plain text as fallback.
fn parse_asr_response(body: &str) -> AsrResult {
    match serde_json::from_str::<AsrJsonResponse>(body) {
        Ok(parsed) => AsrResult {
            text: parsed.text,
            language: parsed.language,
        },
        Err(_) => AsrResult {
            text: body.to_string(),
            language: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_response_is_parsed() {
        let result = parse_asr_response(r#"{"text": "hello world", "language": "en"}"#);
        assert_eq!(result.text, "hello world");
        assert_eq!(result.language.as_deref(), Some("en"));
    }

    #[test]
    fn plain_text_is_wrapped() {
        let result = parse_asr_response("just a transcript line");
        assert_eq!(result.text, "just a transcript line");
        assert!(result.language.is_none());
    }

    #[test]
    fn json_without_text_field_falls_back_to_plain() {
        let raw = r#"{"segments": []}"#;
        let result = parse_asr_response(raw);
        assert_eq!(result.text, raw);
    }
}
