//! Configuration types and utilities for Orchat
//!
//! The configuration lives in a TOML file under the platform config
//! directory. Secrets may instead come from the environment, see
//! [`AppConfig::apply_env`].

use crate::constants::{DEFAULT_HISTORY_WINDOW, provider, search, timeouts};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_TAVILY_API_KEY: &str = "TAVILY_API_KEY";
pub const ENV_MODEL: &str = "ORCHAT_MODEL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub provider: ProviderConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub conversation: ConversationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            provider: ProviderConfig::default(),
            search: SearchConfig::default(),
            storage: StorageConfig::default(),
            conversation: ConversationConfig::default(),
        }
    }
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key (optional, can use environment variables)
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Model used when none is given on the command line
    pub default_model: String,
    /// Value of the `HTTP-Referer` header sent to OpenRouter
    pub referer: Option<String>,
    /// Request timeout in seconds for non-streaming calls
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: provider::OPENROUTER_API_BASE.to_string(),
            default_model: provider::DEFAULT_MODEL.to_string(),
            referer: None,
            timeout_seconds: timeouts::DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Web search collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Tavily key; DuckDuckGo instant answers are used without one
    pub tavily_api_key: Option<String>,
    pub max_results: usize,
    pub search_depth: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            max_results: search::DEFAULT_MAX_RESULTS,
            search_depth: search::DEFAULT_SEARCH_DEPTH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SurrealDB file-based storage
    SurrealFile,
    /// SurrealDB in-memory storage
    SurrealMemory,
    /// Process-local map, lost on exit
    InMemory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Storage path for file-based backends
    pub path: PathBuf,
    pub namespace: String,
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::SurrealFile,
            path: PathBuf::from("./data/threads.db"),
            namespace: "orchat".to_string(),
            database: "chat".to_string(),
        }
    }
}

/// How several ready tool calls in one turn are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiToolPolicy {
    /// Each call gets its own follow-up stream; the last one's text survives
    #[default]
    LastWins,
    /// All results go into a single follow-up stream
    Merged,
}

/// Per-turn orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Prior messages sent with each new user message
    pub history_window: usize,
    pub multi_tool_policy: MultiToolPolicy,
    /// Deadline for opening a completion stream; `None` waits forever
    pub stream_open_timeout_seconds: Option<u64>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            multi_tool_policy: MultiToolPolicy::default(),
            stream_open_timeout_seconds: Some(timeouts::DEFAULT_STREAM_OPEN_TIMEOUT),
        }
    }
}

impl ConversationConfig {
    pub fn stream_open_timeout(&self) -> Option<Duration> {
        self.stream_open_timeout_seconds.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            let config_str = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            toml::from_str(&config_str)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))
        } else {
            debug!("No config at {:?}, writing defaults", config_path);
            let config = AppConfig::default();
            config.save(config_path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let config_path = config_path.as_ref();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let config_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, config_str)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("orchat").join("config.toml"))
    }

    /// Override secrets and the default model from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_OPENROUTER_API_KEY) {
            self.provider.api_key = Some(key);
        }
        if let Some(key) = non_empty(ENV_TAVILY_API_KEY) {
            self.search.tavily_api_key = Some(key);
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.provider.default_model = model;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = AppConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.conversation.history_window, 6);
        assert_eq!(config.conversation.multi_tool_policy, MultiToolPolicy::LastWins);
        assert_eq!(config.storage.backend, StorageBackend::SurrealFile);
    }

    #[test]
    fn test_save_then_load_keeps_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.conversation.multi_tool_policy = MultiToolPolicy::Merged;
        config.storage.backend = StorageBackend::InMemory;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.conversation.multi_tool_policy, MultiToolPolicy::Merged);
        assert_eq!(loaded.storage.backend, StorageBackend::InMemory);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[conversation]\nhistory_window = 10\n").unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.conversation.history_window, 10);
        assert_eq!(loaded.provider.base_url, provider::OPENROUTER_API_BASE);
        assert_eq!(loaded.search.max_results, 5);
    }

    #[test]
    fn test_env_overrides_skip_blank_values() {
        let env: HashMap<&str, &str> = [
            (ENV_OPENROUTER_API_KEY, "sk-or-test"),
            (ENV_TAVILY_API_KEY, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.provider.api_key.as_deref(), Some("sk-or-test"));
        assert!(config.search.tavily_api_key.is_none());
        assert_eq!(config.provider.default_model, provider::DEFAULT_MODEL);
    }
}
