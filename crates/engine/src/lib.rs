//! # Palaver Engine
//!
//! The conversation context engine:
//!
//! - [`history::HistoryBuffer`] — fixed-capacity rotating message history
//! - [`budget`] — token-budgeted truncation against the rendered prompt
//! - [`extract`] — recovery of structured commands from messy model output
//! - [`conversation::Conversation`] — history + pinned context + debounced
//!   change notifications + staged prompt assembly
//! - [`chain::ConversationChain`] — a ring of conversations forwarding to
//!   each other with a single chain-wide turn gate
//! - [`turn::TurnController`] — one bounded model round: dispatch, parse,
//!   execute commands, feed results back
//!
//! The engine consumes the trait seams from `palaver-core` and never talks
//! to a concrete backend, store, or client surface.

pub mod budget;
pub mod chain;
pub mod conversation;
pub mod debounce;
pub mod extract;
pub mod history;
pub mod prompt;
pub mod turn;

pub use chain::ConversationChain;
pub use conversation::Conversation;
pub use debounce::{Debounce, DebouncePhase};
pub use extract::ExtractedResponse;
pub use history::HistoryBuffer;
pub use prompt::BotProfile;
pub use turn::TurnController;
