//! The `chat` subcommand.
//!
//! Without `-m` this runs the interactive terminal client; with `-m` it
//! pushes a single message, runs one full turn, and prints the transcript.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use palaver_channels::{StdoutSink, TerminalClient};
use palaver_config::AppConfig;
use palaver_core::{ChatBackend, CommandDispatch, ConvMessage, EmbeddingBackend, Role};
use palaver_engine::{Conversation, ConversationChain, TurnController};
use palaver_tools::{CommandHandler, HttpPageReader};
use tracing::info;

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;
    let backend = super::build_backend(&config)?;
    let store = super::build_store(&config, backend.clone() as Arc<dyn EmbeddingBackend>).await?;

    let reader = HttpPageReader::new(
        backend.clone() as Arc<dyn ChatBackend>,
        &config.profile.bot_name,
    );
    let mut handler = CommandHandler::new().with_reader(Arc::new(reader));
    if let Some(store) = &store {
        handler = handler.with_memory(Arc::clone(store));
    }
    if let Some(executor) = &config.tools.python_executor {
        handler = handler.with_python_executor(executor);
    }
    let dispatch: Arc<dyn CommandDispatch> = Arc::new(handler);

    let mut conversation = Conversation::new(
        super::bot_profile(&config),
        backend as Arc<dyn ChatBackend>,
        config.engine.history_capacity,
        Duration::from_millis(config.engine.process_delay_ms),
    )
    .with_tools_reference(dispatch.reference());
    if let Some(store) = &store {
        conversation = conversation.with_memory(Arc::clone(store));
    }

    let controller = TurnController::new(Arc::new(StdoutSink)).with_dispatch(dispatch);
    let chain = ConversationChain::new(controller);
    chain.add_conversation(Arc::new(conversation));

    match message {
        Some(text) => send_once(&chain, text).await,
        None => {
            info!(bot = %config.profile.bot_name, "starting chat, Ctrl-D exits");
            TerminalClient::new(chain, "User").run().await?;
        }
    }
    Ok(())
}

/// Push one message, run the turn, and print what came back.
async fn send_once(chain: &Arc<ConversationChain>, text: String) {
    let Some(target) = chain.push(ConvMessage::user("User", text)).await else {
        return;
    };
    chain.chat_member(&target).await;
    let Some(member) = chain.member(&target) else {
        return;
    };
    for message in member.messages_after(None).await {
        match message.role {
            Role::Assistant => println!("{}: {}", message.sender, message.content),
            Role::System => println!("{}", message.content),
            Role::User => {}
        }
    }
}
