//! Pure Ollama REST API client
//!
//! A clean, minimal client for an Ollama-compatible endpoint with no
//! domain-specific logic. Supports text chat and vision chat (messages
//! carrying base64 images).
//!
//! # Example
//!
//! ```rust,ignore
//! use ollama_client::{ChatRequest, Message, OllamaClient};
//!
//! let client = OllamaClient::new("http://localhost:11434");
//!
//! let text = client
//!     .chat(
//!         ChatRequest::new("qwen2.5")
//!             .message(Message::user("Summarize this."))
//!             .temperature(0.3),
//!     )
//!     .await?;
//! ```

pub mod error;
pub mod types;

pub use error::{OllamaError, Result};
pub use types::*;

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

/// Pure Ollama API client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http_client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a new client against the given host, e.g. `http://localhost:11434`.
    ///
    /// Vision scoring of a full-page screenshot can take minutes on modest
    /// hardware, so the request timeout is generous.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a chat request and return the assistant message content.
    pub async fn chat(&self, request: ChatRequest) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending chat request"
        );

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(OllamaError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OllamaError::Api(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(OllamaError::from)?;
        Ok(parsed.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }
}
