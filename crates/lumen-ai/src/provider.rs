//! Streaming chat-completion client

use crate::{
    error::{Error, Result},
    sse::{ProviderEventStream, decode_stream},
    types::{ChatMessage, ChatRequest, ModelConfig},
};

/// Chat-completion API client
pub struct ChatClient {
    client: reqwest::Client,
    config: ModelConfig,
}

impl ChatClient {
    /// Create a new client for the given provider configuration
    pub fn new(config: ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Get the provider configuration
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Build the streaming request payload for a message list
    pub fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        }
    }

    /// Open a chat stream for the given messages.
    ///
    /// A non-success status reads the body into an [`Error::Api`] whose
    /// message carries the provider's text verbatim.
    pub async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<ProviderEventStream> {
        if self.config.api_key.is_empty() {
            return Err(Error::InvalidApiKey);
        }

        let request = self.request(messages);
        let url = format!("{}/chat/completions", self.config.base_url);

        tracing::debug!(model = %self.config.model, "opening chat stream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), message));
        }

        Ok(decode_stream(response.bytes_stream()))
    }
}
