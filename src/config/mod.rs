//! Configuration Module
//!
//! Handles application configuration loading, validation, and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Wizard session behaviour
    #[serde(default)]
    pub wizard: WizardConfig,

    /// Where progress snapshots are kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Auth step backend
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardConfig {
    /// Key under which progress is saved and resumed
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// Upper bound on a step action, in seconds
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,

    /// Arrow keys navigate between steps
    #[serde(default = "default_enabled")]
    pub keyboard_navigation: bool,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            action_timeout_secs: default_action_timeout_secs(),
            keyboard_navigation: true,
        }
    }
}

impl WizardConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

fn default_session_id() -> String {
    crate::wizard::controller::DEFAULT_SESSION_ID.to_string()
}

fn default_action_timeout_secs() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

/// Progress store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Nothing survives the process
    Memory,
    /// One JSON file per session
    #[default]
    File,
    /// SQLite database
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            other => anyhow::bail!(
                "Unknown storage backend: {}. Must be one of: memory, file, sqlite",
                other
            ),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory (file backend) or database file (sqlite backend).
    /// Defaults to a per-user data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let base = data_dir();
        match self.backend {
            StorageBackend::Sqlite => base.join("progress.db"),
            StorageBackend::Memory | StorageBackend::File => base.join("progress"),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stepwise")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HTTP endpoint for the connect action. Unset = simulated sign-in.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Latency of the simulated sign-in, in milliseconds
    #[serde(default = "default_simulated_latency_ms")]
    pub simulated_latency_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            simulated_latency_ms: default_simulated_latency_ms(),
        }
    }
}

impl AuthConfig {
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}

fn default_simulated_latency_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log to file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. Default values
    /// 2. System config: ~/.config/stepwise/config.toml
    /// 3. Local config: ./stepwise.toml
    /// 4. Environment variables
    pub fn load() -> Result<Self> {
        tracing::debug!("Loading configuration...");

        let mut config = Self::default();

        if let Some(system_config_path) = Self::system_config_path()
            && system_config_path.exists()
        {
            tracing::debug!("Loading system config from: {:?}", system_config_path);
            config = Self::merge_from_file(config, &system_config_path)?;
        }

        let local_config_path = Self::local_config_path();
        if local_config_path.exists() {
            tracing::debug!("Loading local config from: {:?}", local_config_path);
            config = Self::merge_from_file(config, &local_config_path)?;
        }

        config = Self::apply_env_overrides(config, |key| std::env::var(key).ok())?;

        tracing::debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load configuration from a specific file path
    ///
    /// Priority (lowest to highest):
    /// 1. Default values
    /// 2. Custom config file (specified path)
    /// 3. Environment variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading configuration from custom path: {:?}", path);

        if !path.exists() {
            anyhow::bail!("Config file not found: {:?}", path);
        }
        let config = Self::merge_from_file(Self::default(), path)?;
        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok())?;

        tracing::debug!("Configuration loaded successfully from custom path");
        Ok(config)
    }

    /// Get the system config path: ~/.config/stepwise/config.toml
    pub fn system_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stepwise").join("config.toml"))
    }

    /// Get the local config path: ./stepwise.toml
    pub fn local_config_path() -> PathBuf {
        PathBuf::from("./stepwise.toml")
    }

    /// Load a TOML file and layer it over `base`, key by key.
    fn merge_from_file(base: Self, path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let overlay: toml::Table = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Self::merge(base, overlay)
            .with_context(|| format!("Invalid config file: {:?}", path))
    }

    /// Keys present in `overlay` win; everything else keeps the base value.
    fn merge(base: Self, overlay: toml::Table) -> Result<Self> {
        let mut merged = toml::Table::try_from(&base).context("Failed to serialize config")?;
        merge_tables(&mut merged, overlay);
        Ok(merged.try_into()?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides<F>(mut config: Self, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(session) = env("STEPWISE_SESSION") {
            config.wizard.session_id = session;
        }

        if let Some(timeout) = env("STEPWISE_ACTION_TIMEOUT_SECS") {
            config.wizard.action_timeout_secs = timeout
                .parse()
                .with_context(|| format!("Invalid STEPWISE_ACTION_TIMEOUT_SECS: {}", timeout))?;
        }

        if let Some(keyboard) = env("STEPWISE_KEYBOARD_NAVIGATION") {
            config.wizard.keyboard_navigation = keyboard
                .parse()
                .with_context(|| format!("Invalid STEPWISE_KEYBOARD_NAVIGATION: {}", keyboard))?;
        }

        if let Some(backend) = env("STEPWISE_STORAGE_BACKEND") {
            config.storage.backend = backend.parse()?;
        }

        if let Some(path) = env("STEPWISE_STORAGE_PATH") {
            config.storage.path = Some(PathBuf::from(path));
        }

        if let Some(endpoint) = env("STEPWISE_AUTH_ENDPOINT") {
            config.auth.endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }

        if let Some(log_level) = env("STEPWISE_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        if let Some(log_file) = env("STEPWISE_LOG_FILE") {
            config.logging.file = Some(PathBuf::from(log_file));
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        tracing::debug!("Validating configuration...");

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        if self.wizard.session_id.trim().is_empty() {
            anyhow::bail!("wizard.session_id must not be empty");
        }

        if self.wizard.action_timeout_secs == 0 {
            anyhow::bail!("wizard.action_timeout_secs must be greater than zero");
        }

        if let Some(endpoint) = &self.auth.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            anyhow::bail!("auth.endpoint must be an http(s) URL, got: {}", endpoint);
        }

        if let Some(parent) = self.storage.resolved_path().parent()
            && !parent.exists()
        {
            tracing::warn!(
                "Storage parent directory does not exist, will be created: {:?}",
                parent
            );
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Configuration saved to: {:?}", path);
        Ok(())
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
