//! Error taxonomy for the whole workspace.
//!
//! Each bounded context gets its own error enum; the top-level [`Error`]
//! aggregates them for callers that cross context boundaries. Parse failures
//! never appear here — the extractor recovers them by falling back to plain
//! text, so by construction it has no invalid input.

use thiserror::Error;

/// Top-level error type aggregating all subsystem errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("command error: {0}")]
    Command(#[from] CommandError),

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used across all crates.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Errors from the model backend (chat, token counting, embeddings).
///
/// These surface inside a turn as a system-role message; the turn ends
/// without a retry.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),
}

/// Errors from the memory store.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("invalid memory entry: {0}")]
    InvalidEntry(String),
}

/// Errors from command dispatch.
///
/// Rendered into the command's response text and fed back into the
/// conversation as system content, consuming one turn retry.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}
