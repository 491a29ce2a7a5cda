//! Ollama API request and response types.

use serde::{Deserialize, Serialize};

// =============================================================================
// Chat
// =============================================================================

/// Chat request for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model to use (e.g., "llama3.2-vision", "qwen2.5")
    pub model: String,

    /// Conversation messages
    pub messages: Vec<Message>,

    /// Disable streaming so the response is a single JSON object
    pub stream: bool,

    /// Sampling options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

impl ChatRequest {
    /// Create a new non-streaming chat request with the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            stream: false,
            options: None,
        }
    }

    /// Add a message to the conversation.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options
            .get_or_insert_with(ChatOptions::default)
            .temperature = Some(temperature);
        self
    }

    /// Cap the number of generated tokens.
    pub fn num_predict(mut self, num_predict: i32) -> Self {
        self.options
            .get_or_insert_with(ChatOptions::default)
            .num_predict = Some(num_predict);
        self
    }
}

/// Sampling options passed through to the model.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "system", "user", or "assistant"
    pub role: String,

    /// Message text
    pub content: String,

    /// Base64-encoded images for vision models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            images: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: None,
        }
    }

    /// Create a user message carrying raw image bytes (base64-encoded on the wire).
    pub fn user_with_image(content: impl Into<String>, image: &[u8]) -> Self {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: Some(vec![encoded]),
        }
    }
}

/// Chat response from `POST /api/chat` (non-streaming).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub message: ResponseMessage,
    #[serde(default)]
    pub done: bool,
}

/// The assistant message inside a chat response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}
