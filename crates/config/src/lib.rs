//! Configuration loading and validation for Palaver.
//!
//! Loads `palaver.toml` from the working directory (or an explicit path),
//! with a `PALAVER_API_KEY` environment override for the backend key.
//! Section structs mirror the crates they configure; every field has a
//! default so an empty file is a runnable configuration.

use std::collections::BTreeMap;
use std::path::Path;

use palaver_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "palaver.toml";

/// The root configuration structure, mapping directly to `palaver.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Who the bot is and how it speaks.
    #[serde(default)]
    pub profile: ProfileConfig,

    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Model backend connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Long-term memory store.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Command execution.
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl AppConfig {
    /// Load from an explicit path, or `palaver.toml` in the working
    /// directory. A missing file yields the defaults.
    ///
    /// `PALAVER_API_KEY` overrides a missing `[backend] api_key`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let mut config = Self::load_from(path)?;
        if config.backend.api_key.is_none() {
            config.backend.api_key = std::env::var("PALAVER_API_KEY").ok();
        }
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Generate the default configuration as a TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        if self.profile.bot_name.trim().is_empty() {
            return Err(Error::config("[profile] bot_name must not be empty"));
        }
        if self.engine.history_capacity == 0 {
            return Err(Error::config("[engine] history_capacity must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.engine.memory_fraction) {
            return Err(Error::config(
                "[engine] memory_fraction must be between 0.0 and 1.0",
            ));
        }
        if self.backend.max_new_tokens >= self.backend.token_limit {
            return Err(Error::config(
                "[backend] max_new_tokens must be smaller than token_limit",
            ));
        }
        Ok(())
    }
}

/// `[profile]`: identity and prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Persona lines forming the head of the context block.
    #[serde(default)]
    pub persona: Vec<String>,

    /// Instruction template; may use `{tools}`, `{now}`, `{language}`.
    #[serde(default)]
    pub instructions: String,

    /// Framing lines shown while the history is below capacity.
    #[serde(default)]
    pub opening: Vec<String>,

    /// Literal text prepended to every rendered prompt.
    #[serde(default)]
    pub prefix: String,

    #[serde(default = "default_turn_template")]
    pub turn_template: String,

    /// Seed for the `{bot_message}` slot.
    #[serde(default)]
    pub bot_message: String,

    /// Extra substitution variables available to all templates.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

fn default_bot_name() -> String {
    "Palaver".into()
}
fn default_language() -> String {
    "en".into()
}
fn default_turn_template() -> String {
    "{user_message}\n{bot_name}:{bot_message}".into()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            bot_name: default_bot_name(),
            language: default_language(),
            persona: Vec::new(),
            instructions: String::new(),
            opening: Vec::new(),
            prefix: String::new(),
            turn_template: default_turn_template(),
            bot_message: String::new(),
            vars: BTreeMap::new(),
        }
    }
}

/// `[engine]`: history and debounce tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rotating history capacity per conversation.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Debounce delay between a push burst and its deferred processing.
    #[serde(default = "default_process_delay_ms")]
    pub process_delay_ms: u64,

    /// Fraction of the context window memory excerpts may occupy.
    #[serde(default = "default_memory_fraction")]
    pub memory_fraction: f32,

    /// How many memory excerpts to request per prompt.
    #[serde(default = "default_memory_excerpts")]
    pub memory_excerpts: usize,
}

fn default_history_capacity() -> usize {
    100
}
fn default_process_delay_ms() -> u64 {
    4000
}
fn default_memory_fraction() -> f32 {
    0.5
}
fn default_memory_excerpts() -> usize {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            process_delay_ms: default_process_delay_ms(),
            memory_fraction: default_memory_fraction(),
            memory_excerpts: default_memory_excerpts(),
        }
    }
}

/// `[backend]`: model service connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Which backend to construct: `openai` or `ollama`.
    #[serde(default = "default_backend_kind")]
    pub kind: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for `/embeddings`; defaults to the chat model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// The model's total context window, in tokens.
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    /// Tokens reserved for the model's reply.
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend_kind() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_token_limit() -> usize {
    4096
}
fn default_max_new_tokens() -> usize {
    512
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            embedding_model: None,
            token_limit: default_token_limit(),
            max_new_tokens: default_max_new_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("embedding_model", &self.embedding_model)
            .field("token_limit", &self.token_limit)
            .field("max_new_tokens", &self.max_new_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Redact a secret for Debug output.
fn redact(secret: &Option<String>) -> &'static str {
    match secret {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// `[memory]`: long-term note storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Which store to construct: `sqlite`, `in_memory`, or `none`.
    #[serde(default = "default_memory_kind")]
    pub kind: String,

    /// Database path for the sqlite store.
    #[serde(default = "default_memory_path")]
    pub path: String,
}

fn default_memory_kind() -> String {
    "sqlite".into()
}
fn default_memory_path() -> String {
    "palaver.db".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            kind: default_memory_kind(),
            path: default_memory_path(),
        }
    }
}

/// `[tools]`: command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Whether extracted commands are executed at all.
    #[serde(default = "default_true")]
    pub allow_commands: bool,

    /// Base URL of the python executor service, e.g. `http://localhost:5000`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_executor: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allow_commands: true,
            python_executor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.profile.bot_name, "Palaver");
        assert_eq!(config.engine.history_capacity, 100);
        assert_eq!(config.backend.kind, "openai");
        assert!(config.tools.allow_commands);
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = AppConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.profile.bot_name, config.profile.bot_name);
        assert_eq!(parsed.engine.process_delay_ms, config.engine.process_delay_ms);
        assert_eq!(parsed.backend.base_url, config.backend.base_url);
    }

    #[test]
    fn a_sparse_file_fills_in_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[profile]
bot_name = "Eve"
persona = ["Eve is a terse assistant."]

[backend]
kind = "ollama"
model = "llama3"
"#,
        )
        .unwrap();
        assert_eq!(config.profile.bot_name, "Eve");
        assert_eq!(config.profile.language, "en");
        assert_eq!(config.backend.kind, "ollama");
        assert_eq!(config.backend.token_limit, 4096);
        assert_eq!(config.memory.kind, "sqlite");
    }

    #[test]
    fn out_of_range_memory_fraction_is_rejected() {
        let mut config = AppConfig::default();
        config.engine.memory_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reply_reservation_must_fit_the_window() {
        let mut config = AppConfig::default();
        config.backend.max_new_tokens = config.backend.token_limit;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/palaver.toml")).unwrap();
        assert_eq!(config.profile.bot_name, "Palaver");
    }

    #[test]
    fn files_load_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("palaver.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[engine]\nhistory_capacity = 0").unwrap();

        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn secrets_do_not_appear_in_debug_output() {
        let mut config = AppConfig::default();
        config.backend.api_key = Some("sk-secret".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_is_parseable() {
        let rendered = AppConfig::default_toml();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
