//! The command dispatcher.
//!
//! Executes [`CommandRecord`]s recovered from model output: memory writes,
//! web lookups, python evaluation, and the exit valediction. A non-empty
//! result is prefixed with the backticked command name and feeds back into
//! the conversation as system content; the turn controller renders errors
//! into the same shape.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use palaver_core::{
    CommandContext, CommandDispatch, CommandError, CommandName, CommandRecord, MemoryStore,
};
use palaver_engine::extract::command_content;
use palaver_engine::prompt::current_datetime;
use regex_lite::Regex;
use tracing::{debug, info};

use crate::browser::PageReader;
use crate::docs;

const DEFAULT_QUESTION: &str = "what is on the website?";

/// Executes the closed command set against optionally-wired capabilities.
///
/// Every capability is optional. Memory commands without a store are silent
/// no-ops; `browse_website` and `python` without their services report an
/// error the model can react to.
pub struct CommandHandler {
    memory: Option<Arc<dyn MemoryStore>>,
    reader: Option<Arc<dyn PageReader>>,
    python_executor: Option<String>,
    client: reqwest::Client,
}

impl CommandHandler {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to create HTTP client");
        Self {
            memory: None,
            reader: None,
            python_executor: None,
            client,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn PageReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Base URL of the python executor service, e.g. `http://localhost:5000`.
    pub fn with_python_executor(mut self, url: impl Into<String>) -> Self {
        self.python_executor = Some(url.into());
        self
    }

    async fn store(&self, content: &str, ctx: &CommandContext) -> Result<(), CommandError> {
        let Some(memory) = &self.memory else {
            debug!("store_memory without a memory store");
            return Ok(());
        };
        if content.is_empty() || ctx.memory_context.is_empty() {
            return Ok(());
        }
        let note = format!("from {}: {}", current_datetime(), content);
        memory
            .add(&ctx.memory_context, &note)
            .await
            .map_err(|e| CommandError::Execution(e.to_string()))
    }

    async fn forget(&self, content: &str, ctx: &CommandContext) -> Result<(), CommandError> {
        let Some(memory) = &self.memory else {
            debug!("delete_memory without a memory store");
            return Ok(());
        };
        if content.is_empty() || ctx.memory_context.is_empty() {
            return Ok(());
        }
        memory
            .del(&ctx.memory_context, content)
            .await
            .map_err(|e| CommandError::Execution(e.to_string()))
    }

    async fn browse(
        &self,
        record: &CommandRecord,
        content: &str,
        ctx: &CommandContext,
    ) -> Result<String, CommandError> {
        let Some(reader) = &self.reader else {
            return Ok("ERROR: Your browser is broken.".into());
        };
        let url = match record.arg("url") {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => match first_url(content) {
                Some(url) => url,
                None => return Ok("ERROR: no URL provided".into()),
            },
        };
        // Without an explicit question the whole block content stands in,
        // unless it is nothing but the URL itself.
        let question = match record.arg("question") {
            Some(q) if !q.trim().is_empty() => q.trim().to_string(),
            _ if content.len() > url.len() => content.to_string(),
            _ => DEFAULT_QUESTION.to_string(),
        };
        reader.read_page(&url, &question, &ctx.language).await
    }

    async fn python(&self, content: &str) -> Result<String, CommandError> {
        if content.is_empty() {
            return Ok(String::new());
        }
        let Some(executor) = &self.python_executor else {
            return Err(CommandError::NotConfigured("python executor"));
        };
        let url = format!("{}/execute", executor.trim_end_matches('/'));
        debug!(url, "posting python code");
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(content.to_string())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CommandError::Execution(e.to_string()))?;
        response
            .text()
            .await
            .map_err(|e| CommandError::Execution(e.to_string()))
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandDispatch for CommandHandler {
    async fn execute(
        &self,
        record: &CommandRecord,
        ctx: &CommandContext,
    ) -> Result<String, CommandError> {
        let content = command_content(record);
        let content = content.trim();

        let mut response = String::new();
        match record.name {
            CommandName::Nop => {}
            CommandName::StoreMemory => self.store(content, ctx).await?,
            CommandName::DeleteMemory => self.forget(content, ctx).await?,
            CommandName::BrowseWebsite => response = self.browse(record, content, ctx).await?,
            CommandName::Python => response = self.python(content).await?,
            CommandName::Exit => info!(valediction = %content, "conversation ended by command"),
        }

        if !response.is_empty() {
            response = format!("`{}`: {response}", record.name);
        }
        Ok(response)
    }

    fn reference(&self) -> String {
        docs::render_reference()
    }
}

/// First `http(s)://` URL in the text, trailing punctuation trimmed.
fn first_url(text: &str) -> Option<String> {
    let re = Regex::new(r"\bhttps?://\S+").ok()?;
    re.find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')']).to_string())
}
