use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "bot.yaml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    /// Only ever exposed when handed to the gateway client.
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub bot_token: SecretString,
    #[serde(default = "default_use_privileged_intents")]
    pub use_privileged_intents: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    #[serde(default = "default_relay_file")]
    pub relay_file: PathBuf,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bot_token: empty_secret(),
            use_privileged_intents: default_use_privileged_intents(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            relay_file: default_relay_file(),
            refresh_interval_secs: default_refresh_interval_secs(),
            reply_timeout_secs: default_reply_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl BotConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }
}

impl Config {
    /// Loads `path`, or `bot.yaml` when no path is given. A missing default
    /// file yields the built-in defaults; a missing explicit file is an error.
    /// The result is not validated yet; callers apply their own overrides and
    /// then call [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::parse_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::parse_file(default_path)?
                } else {
                    debug!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH);
                    Config::default()
                }
            }
        };

        config.apply_env_overrides_from(lookup);
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// `TOKEN` takes precedence over `DISCORD_TOKEN`.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("TOKEN")
            .filter(|value| !value.is_empty())
            .or_else(|| lookup("DISCORD_TOKEN").filter(|value| !value.is_empty()));
        if let Some(token) = token {
            self.auth.bot_token = SecretString::from(token);
        }
        if let Some(relay_file) = lookup("RELAY_FILE").filter(|value| !value.is_empty()) {
            self.bot.relay_file = PathBuf::from(relay_file);
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_use_privileged_intents() -> bool {
    true
}

fn default_command_prefix() -> String {
    "<".to_string()
}

fn default_relay_file() -> PathBuf {
    PathBuf::from("config.json")
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_reply_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}
