//! The interactive terminal client.
//!
//! Reads lines from stdin, routes them into a [`ConversationChain`], and
//! replays conversation updates to stdout. The replay cursor tracks the last
//! printed sequence number, so each update prints only what is new.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use palaver_core::{ChainEvent, ConvMessage, ResponseSink, Result, Role};
use palaver_engine::ConversationChain;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Terminal chat surface over a conversation chain.
pub struct TerminalClient {
    chain: Arc<ConversationChain>,
    username: String,
}

impl TerminalClient {
    pub fn new(chain: Arc<ConversationChain>, username: impl Into<String>) -> Self {
        Self {
            chain,
            username: username.into(),
        }
    }

    /// Run until stdin closes.
    pub async fn run(&self) -> Result<()> {
        let replay = tokio::spawn(replay_loop(
            Arc::clone(&self.chain),
            self.username.clone(),
        ));

        let mut lines = BufReader::new(io::stdin()).lines();
        print_prompt(&self.username);
        while let Some(line) = lines.next_line().await? {
            let content = line.trim().to_string();
            if content.is_empty() {
                continue;
            }
            let message = ConvMessage::user(self.username.clone(), content);
            // Fire and forget: the chain gate drops overlapping chat
            // triggers, and the reply arrives through the replay loop.
            let chain = Arc::clone(&self.chain);
            tokio::spawn(async move {
                if let Some(target) = chain.push(message).await {
                    chain.chat_member(&target).await;
                }
            });
        }

        replay.abort();
        info!("terminal client shutting down");
        Ok(())
    }
}

async fn replay_loop(chain: Arc<ConversationChain>, username: String) {
    let mut events = chain.subscribe();
    let mut cursor = None;
    loop {
        match events.recv().await {
            Ok(ChainEvent::Updated(id)) => {
                let Some(conversation) = chain.member(&id) else {
                    continue;
                };
                let messages = conversation.messages_after(cursor).await;
                let Some(latest) = messages.last().map(|m| m.sequence) else {
                    continue;
                };
                cursor = Some(latest);

                let (text, reprint) = render_batch(&messages, &username);
                print!("{text}");
                if reprint {
                    print_prompt(&username);
                } else {
                    let _ = std::io::stdout().flush();
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "terminal replay lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Render one update batch. Returns the text to print and whether the input
/// prompt should be redrawn; the user's own echoed messages suppress the
/// redraw because the prompt is still live on their screen.
fn render_batch(messages: &[ConvMessage], username: &str) -> (String, bool) {
    let mut out = String::new();
    let mut reprint = true;
    for message in messages {
        match message.role {
            Role::User if message.sender == username => reprint = false,
            Role::User | Role::Assistant => {
                out.push_str(&format!("{}: {}\n", message.sender, message.content));
            }
            Role::System => {
                out.push_str(&format!("\n{}\n", message.content));
            }
        }
    }
    (out, reprint)
}

fn print_prompt(username: &str) {
    print!("{username}> ");
    let _ = std::io::stdout().flush();
}

/// Prints sink traffic straight to the terminal, shaped like the replay
/// loop's system messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl ResponseSink for StdoutSink {
    async fn deliver(&self, message: &ConvMessage) -> Result<()> {
        print!("\n{}\n", message.content);
        let _ = std::io::stdout().flush();
        Ok(())
    }
}
