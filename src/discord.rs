use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serenity::all::{
    Cache, Channel, ChannelId, Client as SerenityClient, Context as SerenityContext,
    CreateMessage, EventHandler as SerenityEventHandler, GatewayIntents, Http,
    Message as SerenityMessage, Permissions, Ready,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::admin::{PendingInteractions, RelayAdmin};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::parsers::MessageUtils;
use crate::platform::{ChannelRef, ChatPlatform, InboundMessage};
use crate::relay::{RelayCache, RelayStore};

/// [`ChatPlatform`] backed by serenity's HTTP client and gateway cache.
pub struct SerenityPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn channel(&self, channel_id: u64) -> Option<ChannelRef> {
        if channel_id == 0 {
            return None;
        }
        // Served from the gateway cache when present, otherwise over HTTP.
        match ChannelId::new(channel_id)
            .to_channel((&self.cache, self.http.as_ref()))
            .await
        {
            Ok(Channel::Guild(channel)) => Some(ChannelRef::named(channel_id, channel.name)),
            Ok(_) => Some(ChannelRef::new(channel_id)),
            Err(err) => {
                debug!("channel {} could not be fetched: {err}", channel_id);
                None
            }
        }
    }

    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()> {
        if channel_id == 0 {
            return Err(anyhow!("refusing to send to channel id 0"));
        }
        ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().content(text))
            .await
            .map_err(|e| anyhow!("message send to channel {} failed: {}", channel_id, e))?;
        Ok(())
    }
}

struct RelayEventHandler {
    dispatcher: Arc<RwLock<Option<Arc<Dispatcher>>>>,
    store: Arc<RelayStore>,
    cache: Arc<RelayCache>,
    refresh_interval: Duration,
}

#[serenity::async_trait]
impl SerenityEventHandler for RelayEventHandler {
    async fn ready(&self, _ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({}) in {} guilds",
            ready.user.name,
            ready.user.id,
            ready.guilds.len()
        );

        // Ready fires again on every reconnect.
        self.cache
            .start_periodic_refresh(Arc::clone(&self.store), self.refresh_interval);
    }

    async fn message(&self, ctx: SerenityContext, msg: SerenityMessage) {
        if msg.author.bot {
            return;
        }

        let dispatcher = self.dispatcher.read().await.clone();
        let Some(dispatcher) = dispatcher else {
            debug!("ignoring discord message before dispatcher binding");
            return;
        };

        let permissions = msg
            .author_permissions(&ctx.cache)
            .or_else(|| msg.member.as_ref().and_then(|member| member.permissions));
        let inbound = inbound_message(&msg, is_administrator(permissions));

        if let Err(err) = dispatcher.handle_message(inbound).await {
            error!("failed to handle discord message {}: {err}", msg.id);
        }
    }
}

fn inbound_message(msg: &SerenityMessage, author_is_admin: bool) -> InboundMessage {
    InboundMessage {
        author_id: msg.author.id.get(),
        is_bot: msg.author.bot,
        author_is_admin,
        channel_id: msg.channel_id.get(),
        message_id: msg.id.get(),
        content: msg.content.clone(),
        mentioned_channels: MessageUtils::extract_channel_mentions(&msg.content),
    }
}

fn is_administrator(permissions: Option<Permissions>) -> bool {
    permissions.is_some_and(|perms| perms.administrator())
}

fn gateway_intents(use_privileged_intents: bool) -> GatewayIntents {
    if use_privileged_intents {
        GatewayIntents::all()
    } else {
        GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT
    }
}

pub struct DiscordClient {
    config: Arc<Config>,
    store: Arc<RelayStore>,
    cache: Arc<RelayCache>,
    interactions: Arc<PendingInteractions>,
}

impl DiscordClient {
    pub fn new(
        config: Arc<Config>,
        store: Arc<RelayStore>,
        cache: Arc<RelayCache>,
        interactions: Arc<PendingInteractions>,
    ) -> Self {
        info!("initializing discord client");
        Self {
            config,
            store,
            cache,
            interactions,
        }
    }

    /// Connects to the gateway and handles events until the connection ends.
    pub async fn run(&self) -> Result<()> {
        let intents = gateway_intents(self.config.auth.use_privileged_intents);
        let dispatcher_slot = Arc::new(RwLock::new(None));

        let event_handler = RelayEventHandler {
            dispatcher: Arc::clone(&dispatcher_slot),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            refresh_interval: self.config.bot.refresh_interval(),
        };

        let mut gateway_client =
            SerenityClient::builder(self.config.auth.bot_token.expose_secret(), intents)
                .event_handler(event_handler)
                .await
                .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let platform: Arc<dyn ChatPlatform> = Arc::new(SerenityPlatform::new(
            Arc::clone(&gateway_client.http),
            Arc::clone(&gateway_client.cache),
        ));
        let admin = Arc::new(RelayAdmin::new(
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            Arc::clone(&self.interactions),
            self.config.bot.reply_timeout(),
        ));
        *dispatcher_slot.write().await = Some(Arc::new(Dispatcher::new(
            platform,
            admin,
            Arc::clone(&self.cache),
            self.config.bot.command_prefix.clone(),
        )));

        info!("connecting to discord gateway");
        gateway_client
            .start()
            .await
            .map_err(|err| anyhow!("discord gateway stopped: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use serenity::all::{GatewayIntents, Permissions};

    use super::{gateway_intents, is_administrator};

    #[test]
    fn administrator_flag_decides_admin_status() {
        assert!(is_administrator(Some(Permissions::ADMINISTRATOR)));
        assert!(is_administrator(Some(
            Permissions::ADMINISTRATOR | Permissions::SEND_MESSAGES
        )));
        assert!(!is_administrator(Some(
            Permissions::MANAGE_CHANNELS | Permissions::MANAGE_GUILD
        )));
        assert!(!is_administrator(None));
    }

    #[test]
    fn unprivileged_intents_still_read_message_content() {
        let intents = gateway_intents(false);
        assert!(intents.contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(intents.contains(GatewayIntents::GUILD_MESSAGES));
        assert!(!intents.contains(GatewayIntents::GUILD_PRESENCES));

        assert_eq!(gateway_intents(true), GatewayIntents::all());
    }
}
