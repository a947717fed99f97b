//! Subcommand implementations, plus the shared wiring that turns an
//! [`AppConfig`] into live backend, store, and profile objects.

pub mod chat;
pub mod init;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use palaver_backends::OpenAiBackend;
use palaver_config::AppConfig;
use palaver_core::{EmbeddingBackend, MemoryStore};
use palaver_engine::BotProfile;
use palaver_memory::{InMemoryStore, SqliteStore};

/// Build the chat backend named by `[backend] kind`.
pub(crate) fn build_backend(
    config: &AppConfig,
) -> Result<Arc<OpenAiBackend>, Box<dyn std::error::Error>> {
    let settings = &config.backend;
    let backend = match settings.kind.as_str() {
        "ollama" => OpenAiBackend::ollama(
            &settings.model,
            settings.token_limit,
            settings.max_new_tokens,
        ),
        "openai" => {
            // Check for the API key early — give a clear error
            let Some(api_key) = settings.api_key.clone() else {
                eprintln!();
                eprintln!("  ERROR: No API key configured!");
                eprintln!();
                eprintln!("  Set the environment variable:");
                eprintln!("    PALAVER_API_KEY='sk-...'");
                eprintln!();
                eprintln!("  Or add it to palaver.toml:");
                eprintln!("    [backend]");
                eprintln!("    api_key = \"sk-...\"");
                eprintln!();
                return Err("no API key found, see above for setup instructions".into());
            };
            OpenAiBackend::new(
                &settings.base_url,
                api_key,
                &settings.model,
                settings.token_limit,
                settings.max_new_tokens,
                Duration::from_secs(settings.request_timeout_secs),
            )
        }
        other => {
            return Err(format!(
                "unknown backend kind {other:?}, expected \"openai\" or \"ollama\""
            )
            .into());
        }
    };
    let backend = match &settings.embedding_model {
        Some(model) => backend.with_embedding_model(model),
        None => backend,
    };
    Ok(Arc::new(backend))
}

/// Open the memory store named by `[memory] kind`, or `None` when memory
/// is disabled.
pub(crate) async fn build_store(
    config: &AppConfig,
    embedder: Arc<dyn EmbeddingBackend>,
) -> Result<Option<Arc<dyn MemoryStore>>, Box<dyn std::error::Error>> {
    let settings = &config.memory;
    let store: Arc<dyn MemoryStore> = match settings.kind.as_str() {
        "sqlite" => Arc::new(SqliteStore::open(&settings.path, embedder).await?),
        "in_memory" => Arc::new(InMemoryStore::new(embedder)),
        "none" => return Ok(None),
        other => {
            return Err(format!(
                "unknown memory kind {other:?}, expected \"sqlite\", \"in_memory\", or \"none\""
            )
            .into());
        }
    };
    Ok(Some(store))
}

/// Assemble the bot profile from the `[profile]`, `[engine]`, `[backend]`,
/// and `[tools]` sections.
pub(crate) fn bot_profile(config: &AppConfig) -> BotProfile {
    BotProfile {
        bot_name: config.profile.bot_name.clone(),
        language: config.profile.language.clone(),
        persona: config.profile.persona.clone(),
        instructions: config.profile.instructions.clone(),
        opening: config.profile.opening.clone(),
        prefix: config.profile.prefix.clone(),
        turn_template: config.profile.turn_template.clone(),
        bot_message: config.profile.bot_message.clone(),
        vars: config.profile.vars.clone(),
        max_new_tokens: config.backend.max_new_tokens,
        memory_fraction: config.engine.memory_fraction,
        memory_excerpts: config.engine.memory_excerpts,
        allow_commands: config.tools.allow_commands,
    }
}
