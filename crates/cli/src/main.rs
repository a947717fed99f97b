//! The `palaver` binary.
//!
//! Commands:
//! - `chat`   — interactive terminal chat, or a single message with `-m`
//! - `memory` — inspect and manage the long-term memory store
//! - `init`   — write a default `palaver.toml`

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "palaver",
    about = "A chained-conversation agent runtime",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the bot in the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Inspect and manage the long-term memory store
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },

    /// Write a default palaver.toml to the working directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum MemoryCommands {
    /// Show store statistics
    Stats,

    /// Rank stored notes against a query
    Search {
        query: String,

        /// How many notes to show
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Delete every stored note
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat { message } => commands::chat::run(cli.config.as_deref(), message).await?,
        Commands::Memory { command } => match command {
            MemoryCommands::Stats => commands::memory::stats(cli.config.as_deref()).await?,
            MemoryCommands::Search { query, limit } => {
                commands::memory::search(cli.config.as_deref(), &query, limit).await?
            }
            MemoryCommands::Clear { yes } => {
                commands::memory::clear(cli.config.as_deref(), yes).await?
            }
        },
        Commands::Init { force } => commands::init::run(force)?,
    }

    Ok(())
}
