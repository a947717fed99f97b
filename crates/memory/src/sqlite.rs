//! SQLite store.
//!
//! One table holds note text plus the digest-key embedding as a little-endian
//! f32 blob. Ranking happens in process: rows are loaded and scored against
//! the probe embedding with [`vector::nearest`]. That is plenty for the
//! hundreds-of-notes scale this store sees; there is no vector index.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use palaver_core::{EmbeddingBackend, MemoryError, MemoryStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::vector;

/// A persistent note store backed by a single SQLite file.
pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open(
        path: &str,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("failed to open SQLite: {e}")))?;

        let store = Self { pool, embedder };
        store.run_migrations().await?;
        info!(path, "SQLite note store opened");
        Ok(store)
    }

    /// Wrap an existing pool (useful for testing).
    pub async fn from_pool(
        pool: SqlitePool,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Result<Self, MemoryError> {
        let store = Self { pool, embedder };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                content     TEXT NOT NULL,
                key         BLOB NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("notes table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn probe(&self, context: &str) -> Result<Vec<f32>, MemoryError> {
        self.embedder
            .embed(context)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))
    }

    /// Load every stored row as `(rowid, content, key)`.
    async fn load_all(&self) -> Result<Vec<(i64, String, Vec<f32>)>, MemoryError> {
        let rows = sqlx::query("SELECT id, content, key FROM notes ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("SELECT failed: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: i64 = row
                    .try_get("id")
                    .map_err(|e| MemoryError::InvalidEntry(format!("id column: {e}")))?;
                let content: String = row
                    .try_get("content")
                    .map_err(|e| MemoryError::InvalidEntry(format!("content column: {e}")))?;
                let blob: Vec<u8> = row
                    .try_get("key")
                    .map_err(|e| MemoryError::InvalidEntry(format!("key column: {e}")))?;
                Ok((id, content, blob_to_key(&blob)))
            })
            .collect()
    }
}

fn key_to_blob(key: &[f32]) -> Vec<u8> {
    key.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_key(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn add(&self, context: &str, data: &str) -> Result<(), MemoryError> {
        let key = self.probe(context).await?;

        sqlx::query("INSERT INTO notes (content, key, created_at) VALUES (?1, ?2, ?3)")
            .bind(data)
            .bind(key_to_blob(&key))
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!("stored note");
        Ok(())
    }

    async fn del(&self, context: &str, data: &str) -> Result<(), MemoryError> {
        let probe = self.probe(context).await?;
        let rows = self.load_all().await?;
        let keys: Vec<Vec<f32>> = rows.iter().map(|(_, _, key)| key.clone()).collect();

        let Some(&index) = vector::nearest(&keys, &probe, 1).first() else {
            return Ok(());
        };
        let (id, content, _) = &rows[index];

        sqlx::query("DELETE FROM notes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;

        debug!(note = %content, hint = %data, "deleted nearest note");
        Ok(())
    }

    async fn get(&self, context: &str, num_relevant: usize) -> Result<Vec<String>, MemoryError> {
        let probe = self.probe(context).await?;
        let rows = self.load_all().await?;
        let keys: Vec<Vec<f32>> = rows.iter().map(|(_, _, key)| key.clone()).collect();

        Ok(vector::nearest(&keys, &probe, num_relevant)
            .into_iter()
            .map(|index| rows[index].1.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM notes")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("COUNT failed: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::InvalidEntry(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM notes")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("CLEAR failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::BackendError;
    use std::collections::HashMap;
    use tempfile::TempDir;

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

    fn weather_embedder() -> Arc<TableEmbedder> {
        TableEmbedder::new(&[
            ("talk about sunshine", [1.0, 0.0, 0.0]),
            ("talk about rain", [0.0, 1.0, 0.0]),
            ("mostly about sunshine", [0.9, 0.1, 0.0]),
        ])
    }

    async fn open_store(dir: &TempDir) -> SqliteStore {
        let path = dir.path().join("notes.db");
        SqliteStore::open(path.to_str().unwrap(), weather_embedder())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn notes_rank_by_digest_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.add("talk about sunshine", "alice loves the sun").await.unwrap();
        store.add("talk about rain", "bob hates getting wet").await.unwrap();

        let notes = store.get("mostly about sunshine", 1).await.unwrap();
        assert_eq!(notes, ["alice loves the sun"]);

        let notes = store.get("mostly about sunshine", 5).await.unwrap();
        assert_eq!(notes, ["alice loves the sun", "bob hates getting wet"]);
    }

    #[tokio::test]
    async fn del_removes_the_nearest_note_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.add("talk about sunshine", "alice loves the sun").await.unwrap();
        store.add("talk about rain", "bob hates getting wet").await.unwrap();

        store.del("mostly about sunshine", "the sun note").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let notes = store.get("talk about rain", 5).await.unwrap();
        assert_eq!(notes, ["bob hates getting wet"]);
    }

    #[tokio::test]
    async fn del_on_an_empty_store_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.del("talk about rain", "anything").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn notes_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir).await;
            store.add("talk about sunshine", "alice loves the sun").await.unwrap();
        }

        let store = open_store(&dir).await;
        assert_eq!(store.count().await.unwrap(), 1);
        let notes = store.get("talk about sunshine", 1).await.unwrap();
        assert_eq!(notes, ["alice loves the sun"]);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.add("talk about sunshine", "one").await.unwrap();
        store.add("talk about rain", "two").await.unwrap();

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
