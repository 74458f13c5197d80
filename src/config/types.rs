//! Core configuration types and loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::defaults::{
    default_database_path, default_delete_delay_secs, default_stale_provision_secs,
    default_token_env,
};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Platform connection.
    pub discord: DiscordConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Ticket lifecycle tuning.
    #[serde(default)]
    pub tickets: TicketsConfig,
    /// Transcript staging.
    #[serde(default)]
    pub transcripts: TranscriptsConfig,
    /// Optional Prometheus endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Discord connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token. Prefer `token_env` so the secret stays out of the file.
    pub token: Option<String>,
    /// Environment variable holding the bot token (default: DISCORD_TOKEN).
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Register slash commands to this guild only (instant propagation while testing).
    pub command_guild: Option<u64>,
}

impl DiscordConfig {
    /// Resolve the bot token from the file or the environment.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var(&self.token_env).ok())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or ":memory:".
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Ticket lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketsConfig {
    /// Seconds between the delete notice and channel destruction (default: 5).
    #[serde(default = "default_delete_delay_secs")]
    pub delete_delay_secs: u64,
    /// Seconds after which a ticket row without a channel is purged at startup (default: 300).
    #[serde(default = "default_stale_provision_secs")]
    pub stale_provision_secs: u64,
}

impl TicketsConfig {
    pub fn delete_delay(&self) -> Duration {
        Duration::from_secs(self.delete_delay_secs)
    }
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            delete_delay_secs: default_delete_delay_secs(),
            stale_provision_secs: default_stale_provision_secs(),
        }
    }
}

/// Transcript staging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptsConfig {
    /// Directory for transcript files awaiting upload (default: OS temp dir).
    pub staging_dir: Option<PathBuf>,
}

impl TranscriptsConfig {
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// HTTP port for GET /metrics. Disabled when unset.
    pub port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str("[discord]\ntoken = \"abc\"\n").unwrap();
        assert_eq!(config.database.path, "db/tickets.db");
        assert_eq!(config.tickets.delete_delay_secs, 5);
        assert_eq!(config.tickets.stale_provision_secs, 300);
        assert_eq!(config.discord.token_env, "DISCORD_TOKEN");
        assert!(config.metrics.port.is_none());
        assert_eq!(config.discord.resolve_token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[discord]
token_env = "TICKETD_TEST_TOKEN_UNSET"
command_guild = 42

[database]
path = ":memory:"

[tickets]
delete_delay_secs = 0

[metrics]
port = 9091
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.discord.command_guild, Some(42));
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.tickets.delete_delay(), Duration::ZERO);
        assert_eq!(config.metrics.port, Some(9091));
        assert!(config.discord.resolve_token().is_none());
    }

    #[test]
    fn test_missing_discord_section_is_rejected() {
        assert!(toml::from_str::<Config>("[database]\npath = \"x.db\"\n").is_err());
    }
}
