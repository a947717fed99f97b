//! # Palaver Core
//!
//! Domain types, traits, and error definitions for the Palaver conversation
//! engine. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! Every external capability the engine consumes is a trait here: the model
//! backend, the memory store, the command dispatcher, and the per-client
//! response sink. Implementations live in their respective crates, so
//! backends swap via configuration, tests run against mocks, and the
//! dependency graph always points inward at core.

pub mod backend;
pub mod command;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod sink;

// Re-export key types at crate root for ergonomics
pub use backend::{ChatBackend, EmbeddingBackend};
pub use command::{CommandContext, CommandDispatch, CommandName, CommandRecord};
pub use error::{BackendError, CommandError, Error, MemoryError, Result};
pub use event::{ChainEvent, ConversationEvent, EventBus};
pub use memory::MemoryStore;
pub use message::{ConvMessage, ConversationId, Role};
pub use sink::ResponseSink;
