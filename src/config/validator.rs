use std::path::PathBuf;

use secrecy::ExposeSecret;
use thiserror::Error;

use super::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.bot_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token cannot be empty; set it in the config file or via TOKEN"
                    .to_string(),
            ));
        }

        let prefix = &self.bot.command_prefix;
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidConfig(
                "bot.command_prefix must be non-empty and contain no whitespace".to_string(),
            ));
        }

        if self.bot.relay_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bot.relay_file cannot be empty".to_string(),
            ));
        }

        if self.bot.refresh_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "bot.refresh_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.bot.reply_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "bot.reply_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
