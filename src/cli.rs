use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, ConfigError};

#[derive(Debug, Parser)]
#[command(name = "discord-relay-bot", version, about = "Relays messages between Discord channels")]
pub struct Cli {
    /// YAML config file. Defaults to bot.yaml when present.
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Relay mapping file, overriding bot.relay_file.
    #[arg(long)]
    pub relay_file: Option<PathBuf>,

    /// Log level, overriding logging.level.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load(self.config.as_deref())?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(relay_file) = &self.relay_file {
            config.bot.relay_file = relay_file.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}
