//! Command execution for Palaver conversations.
//!
//! [`CommandHandler`] implements the engine's `CommandDispatch` seam for
//! the closed command vocabulary: memory writes, web page lookups, python
//! evaluation, and the exit valediction. [`HttpPageReader`] is the default
//! web reader; alternative readers plug in through [`PageReader`].

pub mod browser;
pub mod docs;
pub mod handler;

pub use browser::{HttpPageReader, PageReader};
pub use docs::{COMMAND_DOCS, CommandDoc, render_reference};
pub use handler::CommandHandler;
