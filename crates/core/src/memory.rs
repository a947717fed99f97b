//! The long-term memory seam.
//!
//! Notes are stored and retrieved against a *context digest* — the rendered
//! recent history of a conversation. Implementations embed the digest and
//! rank stored notes by similarity; the engine only sees texts.

use async_trait::async_trait;

use crate::error::MemoryError;

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Implementation name for logs.
    fn name(&self) -> &str;

    /// Store a note under the given context digest.
    async fn add(&self, context: &str, data: &str) -> Result<(), MemoryError>;

    /// Remove the stored note nearest to the given context digest.
    async fn del(&self, context: &str, data: &str) -> Result<(), MemoryError>;

    /// Fetch up to `num_relevant` notes ranked by similarity to the digest.
    async fn get(&self, context: &str, num_relevant: usize)
        -> Result<Vec<String>, MemoryError>;

    /// Number of stored notes.
    async fn count(&self) -> Result<usize, MemoryError>;

    /// Remove every stored note.
    async fn clear(&self) -> Result<(), MemoryError>;
}
