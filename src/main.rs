#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

mod admin;
mod cli;
mod commands;
mod config;
mod discord;
mod dispatch;
mod parsers;
mod platform;
mod relay;
mod utils;

#[cfg(test)]
mod testing;

use admin::PendingInteractions;
use cli::Cli;
use relay::{RelayCache, RelayStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(cli.load_config()?);
    utils::logging::init_tracing(&config.logging)?;

    info!("discord relay bot starting up");

    let store = Arc::new(RelayStore::new(config.bot.relay_file.clone()));
    let cache = Arc::new(RelayCache::new());
    cache.refresh(&store).await;
    let mapping = cache.snapshot();
    if mapping.is_empty() {
        warn!(
            "no relays configured in {}; nothing is forwarded until an admin runs {}add",
            store.path().display(),
            config.bot.command_prefix
        );
    } else {
        info!(
            "loaded relay mapping from {} with {} sources",
            store.path().display(),
            mapping.len()
        );
    }

    let interactions = Arc::new(PendingInteractions::new());
    let discord_client = discord::DiscordClient::new(config.clone(), store, cache, interactions);

    tokio::select! {
        result = discord_client.run() => {
            if let Err(err) = &result {
                error!("discord client error: {err}");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c");
        }
    }

    info!("discord relay bot shutting down");
    Ok(())
}
