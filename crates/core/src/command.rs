//! Structured commands recovered from model output.
//!
//! Command names form a closed registry: the extractor validates against
//! [`CommandName`] at parse time, so a `CommandRecord` can never carry an
//! unknown name. Argument order is preserved for faithful re-rendering of
//! the fenced block the model wrote.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// The closed set of commands a bot may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    /// Explicit no-op; executing it produces nothing.
    Nop,
    StoreMemory,
    DeleteMemory,
    BrowseWebsite,
    Python,
    /// Ends the conversation; the outgoing reply is emptied.
    Exit,
}

impl CommandName {
    pub const ALL: [CommandName; 6] = [
        CommandName::Nop,
        CommandName::StoreMemory,
        CommandName::DeleteMemory,
        CommandName::BrowseWebsite,
        CommandName::Python,
        CommandName::Exit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Nop => "nop",
            CommandName::StoreMemory => "store_memory",
            CommandName::DeleteMemory => "delete_memory",
            CommandName::BrowseWebsite => "browse_website",
            CommandName::Python => "python",
            CommandName::Exit => "exit",
        }
    }

    /// Look up a keyword, case-insensitively.
    pub fn parse(keyword: &str) -> Option<CommandName> {
        let lowered = keyword.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == lowered)
    }

    pub fn is_nop(&self) -> bool {
        matches!(self, CommandName::Nop)
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recovered command invocation: a registered name plus ordered
/// string arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub name: CommandName,
    args: Vec<(String, String)>,
}

impl CommandRecord {
    pub fn new(name: CommandName) -> Self {
        Self { name, args: Vec::new() }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_arg(key, value);
        self
    }

    /// Shorthand for the single unnamed `data` argument.
    pub fn with_data(self, value: impl Into<String>) -> Self {
        self.with_arg("data", value)
    }

    /// Insert or replace an argument, keeping first-seen key order.
    pub fn set_arg(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.args.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.args.push((key, value)),
        }
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The unnamed `data` argument, when present.
    pub fn data(&self) -> Option<&str> {
        self.arg("data")
    }

    /// All arguments in insertion order.
    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }
}

/// Conversation-scoped context handed to command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// The conversation's current memory digest.
    pub memory_context: String,
    /// The conversation's language tag.
    pub language: String,
}

/// Executes recovered commands against the outside world.
#[async_trait]
pub trait CommandDispatch: Send + Sync {
    /// Run one command. A non-empty result feeds back into the conversation
    /// as system content; errors are rendered into the same shape by the
    /// caller.
    async fn execute(
        &self,
        record: &CommandRecord,
        ctx: &CommandContext,
    ) -> Result<String, CommandError>;

    /// Rendered documentation of the command vocabulary for the prompt's
    /// tool listing.
    fn reference(&self) -> String;
}
