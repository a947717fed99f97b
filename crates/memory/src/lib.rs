//! Memory store implementations.
//!
//! Notes are keyed by an embedding of the conversation digest at store time;
//! retrieval embeds the current digest and ranks stored keys by cosine
//! similarity. The engine only ever sees note texts.

pub mod in_memory;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use vector::{cosine_similarity, nearest};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
