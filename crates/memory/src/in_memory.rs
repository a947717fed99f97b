//! In-memory store, for tests and ephemeral sessions.

use std::sync::Arc;

use async_trait::async_trait;
use palaver_core::{EmbeddingBackend, MemoryError, MemoryStore};
use tokio::sync::RwLock;
use tracing::debug;

use crate::vector;

struct Note {
    text: String,
    key: Vec<f32>,
}

/// Keeps notes and their digest-key embeddings in a Vec. Nothing survives
/// the process.
pub struct InMemoryStore {
    embedder: Arc<dyn EmbeddingBackend>,
    notes: RwLock<Vec<Note>>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            embedder,
            notes: RwLock::new(Vec::new()),
        }
    }

    async fn probe(&self, context: &str) -> Result<Vec<f32>, MemoryError> {
        self.embedder
            .embed(context)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(&self, context: &str, data: &str) -> Result<(), MemoryError> {
        let key = self.probe(context).await?;
        let mut notes = self.notes.write().await;
        notes.push(Note {
            text: data.to_string(),
            key,
        });
        debug!(stored = notes.len(), "stored note");
        Ok(())
    }

    async fn del(&self, context: &str, data: &str) -> Result<(), MemoryError> {
        let probe = self.probe(context).await?;
        let mut notes = self.notes.write().await;
        let keys: Vec<Vec<f32>> = notes.iter().map(|n| n.key.clone()).collect();
        if let Some(&index) = vector::nearest(&keys, &probe, 1).first() {
            let removed = notes.remove(index);
            debug!(note = %removed.text, hint = %data, "deleted nearest note");
        }
        Ok(())
    }

    async fn get(&self, context: &str, num_relevant: usize) -> Result<Vec<String>, MemoryError> {
        let probe = self.probe(context).await?;
        let notes = self.notes.read().await;
        let keys: Vec<Vec<f32>> = notes.iter().map(|n| n.key.clone()).collect();
        Ok(vector::nearest(&keys, &probe, num_relevant)
            .into_iter()
            .map(|index| notes[index].text.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.notes.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.notes.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::BackendError;
    use std::collections::HashMap;

    /// Deterministic embedder: exact texts map to fixed vectors, anything
    /// else embeds to zero.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
    }

    impl TableEmbedder {
        fn new(entries: &[(&str, [f32; 3])]) -> Arc<Self> {
            Arc::new(Self {
                table: entries
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.to_vec()))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl EmbeddingBackend for TableEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
            Ok(self
                .table
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0; 3]))
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
            Err(BackendError::Http("embedding service down".into()))
        }
    }

    fn weather_store() -> InMemoryStore {
        InMemoryStore::new(TableEmbedder::new(&[
            ("talk about sunshine", [1.0, 0.0, 0.0]),
            ("talk about rain", [0.0, 1.0, 0.0]),
            ("mostly about sunshine", [0.9, 0.1, 0.0]),
        ]))
    }

    #[tokio::test]
    async fn notes_rank_by_digest_similarity() {
        let store = weather_store();
        store.add("talk about sunshine", "alice loves the sun").await.unwrap();
        store.add("talk about rain", "bob hates getting wet").await.unwrap();

        let notes = store.get("mostly about sunshine", 1).await.unwrap();
        assert_eq!(notes, ["alice loves the sun"]);

        let notes = store.get("mostly about sunshine", 5).await.unwrap();
        assert_eq!(notes, ["alice loves the sun", "bob hates getting wet"]);
    }

    #[tokio::test]
    async fn del_removes_the_nearest_note_only() {
        let store = weather_store();
        store.add("talk about sunshine", "alice loves the sun").await.unwrap();
        store.add("talk about rain", "bob hates getting wet").await.unwrap();

        store.del("mostly about sunshine", "the sun note").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let notes = store.get("talk about rain", 5).await.unwrap();
        assert_eq!(notes, ["bob hates getting wet"]);
    }

    #[tokio::test]
    async fn del_on_an_empty_store_is_a_no_op() {
        let store = weather_store();
        store.del("talk about rain", "anything").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_on_an_empty_store_is_empty() {
        let store = weather_store();
        assert!(store.get("talk about rain", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let store = weather_store();
        store.add("talk about sunshine", "one").await.unwrap();
        store.add("talk about rain", "two").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn embedding_failures_surface_as_memory_errors() {
        let store = InMemoryStore::new(Arc::new(FailingEmbedder));
        let error = store.add("context", "note").await.unwrap_err();
        assert!(matches!(error, MemoryError::Embedding(_)));
    }
}
