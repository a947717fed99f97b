//! OpenAI-compatible backend.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, llama.cpp server, and any
//! other endpoint exposing `/chat/completions` and `/embeddings`. One
//! instance serves as both the chat and the embedding capability.

use std::time::Duration;

use async_trait::async_trait;
use palaver_core::{BackendError, ChatBackend, ConvMessage, EmbeddingBackend, Role};
use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

pub struct OpenAiBackend {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
    max_tokens: usize,
    max_new_tokens: usize,
    client: reqwest::Client,
    bpe: Option<CoreBPE>,
}

impl OpenAiBackend {
    /// Create a backend against any OpenAI-compatible endpoint.
    ///
    /// `max_tokens` is the model's context window; `max_new_tokens` caps the
    /// reply length requested per completion.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: usize,
        max_new_tokens: usize,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");
        let model = model.into();

        Self {
            name: "openai".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            embedding_model: model.clone(),
            model,
            max_tokens,
            max_new_tokens,
            client,
            bpe: tiktoken_rs::cl100k_base().ok(),
        }
    }

    /// Create a backend for a local Ollama instance (convenience constructor).
    pub fn ollama(model: impl Into<String>, max_tokens: usize, max_new_tokens: usize) -> Self {
        Self::new(
            "http://localhost:11434/v1",
            "ollama", // Ollama doesn't need a real key
            model,
            max_tokens,
            max_new_tokens,
            Duration::from_secs(120),
        )
        .with_name("ollama")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use a dedicated model for `/embeddings` instead of the chat model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Convert engine messages to the wire format. User content carries the
    /// sender name so the model can tell speakers apart; assistant and
    /// system content pass through unchanged.
    fn to_api_messages(messages: &[ConvMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                }
                .into(),
                content: match m.role {
                    Role::User => format!("{}: {}", m.sender, m.content),
                    _ => m.content.clone(),
                },
            })
            .collect()
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            warn!(status, body = %message, "backend returned an error");
            return Err(BackendError::Api { status, message });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    async fn chat(&self, messages: &[ConvMessage]) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(messages),
            "max_tokens": self.max_new_tokens,
            "stream": false,
        });

        debug!(
            backend = %self.name,
            model = %self.model,
            messages = messages.len(),
            "sending chat request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let api: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let reply = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("no choices in response".into()))?
            .message
            .content
            .unwrap_or_default();

        Ok(reply)
    }

    async fn count_tokens(&self, text: &str) -> Result<usize, BackendError> {
        match &self.bpe {
            Some(bpe) => Ok(bpe.encode_with_special_tokens(text).len()),
            // No tokenizer available: a rough chars-per-token estimate.
            None => Ok((text.len() + 3) / 4),
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
            "encoding_format": "float",
        });

        debug!(backend = %self.name, model = %self.embedding_model, "sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let api: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        api.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| BackendError::InvalidResponse("no embedding in response".into()))
    }
}

// --- wire types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
