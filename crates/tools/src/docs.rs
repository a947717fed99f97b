//! Prompt-facing documentation for the command vocabulary.
//!
//! Each command ships a one-line summary and a fenced syntax example. The
//! rendered listing substitutes into the `{tools}` slot of the bot's
//! instruction template, so wording here is addressed to the model, not to
//! developers.

use palaver_core::command::CommandName;

/// Documentation for a single command.
pub struct CommandDoc {
    pub name: CommandName,
    /// What the command does, addressed to the model.
    pub summary: &'static str,
    /// A fenced usage example in canonical block form.
    pub syntax: &'static str,
}

/// Docs for every callable command. `nop` has no entry: the model needs no
/// instructions for doing nothing.
pub const COMMAND_DOCS: &[CommandDoc] = &[
    CommandDoc {
        name: CommandName::StoreMemory,
        summary: "Used regularly to increase ability to remember important details \
                  and events in memory banks. Effect: Conversation history is \
                  augmented with stored memories, selected depending on current context.",
        syntax: "```store_memory <Detailed note containing all information\nnecessary to form a coherent memory>```",
    },
    CommandDoc {
        name: CommandName::DeleteMemory,
        summary: "Keep memory banks clean and organized with this command.",
        syntax: "```delete_memory <Summary of the note to be deleted>```",
    },
    CommandDoc {
        name: CommandName::BrowseWebsite,
        summary: "Access the internet for information on various subjects.",
        syntax: "```browse_website <Insert URL> <Insert search question>```",
    },
    CommandDoc {
        name: CommandName::Python,
        summary: "Executes non-blocking python code. Do not execute blocking \
                  functions like reading from stdin or endless loops.",
        syntax: "```python\nimport os # Remember to include necessary imports\nprint('Hello, World!') # Your Python code here\n```",
    },
    CommandDoc {
        name: CommandName::Exit,
        summary: "Ends the current conversation completely.",
        syntax: "```exit <valediction message>```",
    },
];

/// Render the vocabulary listing for the `{tools}` prompt variable.
pub fn render_reference() -> String {
    COMMAND_DOCS
        .iter()
        .map(|doc| format!("{}: {}\nSyntax:\n{}", doc.name, doc.summary, doc.syntax))
        .collect::<Vec<_>>()
        .join("\n\n")
}
