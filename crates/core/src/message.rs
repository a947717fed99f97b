//! Message and conversation identity types.
//!
//! These are the value objects that flow through the whole system: a channel
//! receives user input → the conversation records it → the backend replies →
//! the reply (and any command results) land back in the conversation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Framing, command results, and other out-of-band content
    System,
    /// External input — a person, or another bot forwarded into this conversation
    User,
    /// This conversation's own bot
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single conversation message.
///
/// `sequence` is stamped by the owning conversation when the message is
/// inserted and is strictly increasing per conversation; a value of zero on a
/// freshly constructed message means "not yet inserted". Messages are
/// immutable once stored — forwarding between conversations copies the
/// payload and re-stamps the sequence in the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvMessage {
    pub role: Role,
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub sequence: u64,
}

impl ConvMessage {
    pub fn new(role: Role, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            sender: sender.into(),
            content: content.into(),
            sequence: 0,
        }
    }

    /// A message from a person or a forwarded peer.
    pub fn user(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::User, sender, content)
    }

    /// A reply authored by this conversation's bot.
    pub fn assistant(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, sender, content)
    }

    /// Out-of-band content: framing, command results, errors.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, "system", content)
    }

    /// Payload equality, ignoring the insertion sequence.
    pub fn same_payload(&self, other: &ConvMessage) -> bool {
        self.role == other.role && self.sender == other.sender && self.content == other.content
    }
}
