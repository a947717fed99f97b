//! Client surfaces for Palaver conversations.
//!
//! A client owns a [`ConversationChain`](palaver_engine::ConversationChain),
//! feeds user input into it, and replays conversation updates to its medium.
//! The terminal client is the built-in surface; richer clients follow the
//! same shape.

pub mod terminal;

pub use terminal::{StdoutSink, TerminalClient};
