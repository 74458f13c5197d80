//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no bot token: set discord.token or the {0} environment variable")]
    MissingToken(String),
    #[error("discord.command_guild must be a guild id, not 0")]
    InvalidCommandGuild,
    #[error("database.path is empty")]
    EmptyDatabasePath,
    #[error("transcripts.staging_dir does not exist: {0}")]
    StagingDirNotFound(String),
    #[error("metrics.port must be non-zero")]
    InvalidMetricsPort,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.discord.resolve_token().is_none() {
        errors.push(ValidationError::MissingToken(
            config.discord.token_env.clone(),
        ));
    }

    if config.discord.command_guild == Some(0) {
        errors.push(ValidationError::InvalidCommandGuild);
    }

    if config.database.path.trim().is_empty() {
        errors.push(ValidationError::EmptyDatabasePath);
    }

    let staging = config.transcripts.staging_dir();
    if !staging.is_dir() {
        errors.push(ValidationError::StagingDirNotFound(
            staging.display().to_string(),
        ));
    }

    if config.metrics.port == Some(0) {
        errors.push(ValidationError::InvalidMetricsPort);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config_passes() {
        let dir = tempfile::tempdir().unwrap();
        let config: Config = toml::from_str(&format!(
            "[discord]\ntoken = \"abc\"\n[transcripts]\nstaging_dir = {:?}\n",
            dir.path().display().to_string()
        ))
        .unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let config: Config = toml::from_str(
            r#"
[discord]
token_env = "TICKETD_VALIDATION_TOKEN_UNSET"
command_guild = 0

[database]
path = ""

[transcripts]
staging_dir = "/nonexistent/ticketd/staging"

[metrics]
port = 0
"#,
        )
        .unwrap();

        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(matches!(errors[0], ValidationError::MissingToken(_)));
        assert!(matches!(errors[1], ValidationError::InvalidCommandGuild));
        assert!(matches!(errors[2], ValidationError::EmptyDatabasePath));
        assert!(matches!(errors[3], ValidationError::StagingDirNotFound(_)));
        assert!(matches!(errors[4], ValidationError::InvalidMetricsPort));
    }
}
