//! The model backend seam.
//!
//! The engine never talks to a model service directly; it consumes these
//! traits. Both calls are potentially remote and must be treated as
//! always-asynchronous — the engine never assumes a synchronous completion.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::message::ConvMessage;

/// A chat-completion capability with token accounting.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// The model's total context window, in tokens.
    fn max_tokens(&self) -> usize;

    /// Send an assembled message sequence and return the raw reply text.
    async fn chat(&self, messages: &[ConvMessage]) -> Result<String, BackendError>;

    /// Count the tokens of a rendered prompt string.
    ///
    /// Prompt truncation calls this on exactly the text that would be sent,
    /// so implementations must count the same representation they consume.
    async fn count_tokens(&self, text: &str) -> Result<usize, BackendError>;
}

/// A text-embedding capability, used to key the memory store.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;
}
