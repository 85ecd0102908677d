use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::admin::{FlowKind, RelayAdmin, RouteOutcome};
use crate::commands::{BotCommand, NOT_ADMINISTRATOR, help_text};
use crate::parsers::parse_prefixed_command;
use crate::platform::{ChatPlatform, InboundMessage};
use crate::relay::RelayCache;

/// Decides what happens to every inbound message: interaction reply,
/// command, relay forwarding, or nothing.
pub struct Dispatcher {
    platform: Arc<dyn ChatPlatform>,
    admin: Arc<RelayAdmin>,
    cache: Arc<RelayCache>,
    prefix: String,
}

impl Dispatcher {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        admin: Arc<RelayAdmin>,
        cache: Arc<RelayCache>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            admin,
            cache,
            prefix: prefix.into(),
        }
    }

    pub async fn handle_message(&self, message: InboundMessage) -> Result<()> {
        if message.is_bot {
            return Ok(());
        }

        match self.admin.interactions().route(&message) {
            RouteOutcome::Idle => {}
            RouteOutcome::Delivered => {
                debug!("reply from user={} handed to pending command", message.author_id);
                return Ok(());
            }
            RouteOutcome::Suppressed => {
                debug!(
                    "ignoring message from busy user={} in channel={}",
                    message.author_id, message.channel_id
                );
                return Ok(());
            }
        }

        let command_result = self.handle_command(&message).await;
        self.forward(&message).await;
        command_result
    }

    async fn handle_command(&self, message: &InboundMessage) -> Result<()> {
        let Some(parsed) = parse_prefixed_command(&self.prefix, &message.content) else {
            return Ok(());
        };

        let Some(command) = BotCommand::from_name(&parsed.name) else {
            info!("unknown command sent: {}{}", self.prefix, parsed.name);
            return Ok(());
        };

        debug!(
            "command {} from user={} in channel={}",
            parsed.name, message.author_id, message.channel_id
        );
        if command.requires_admin() && !message.author_is_admin {
            info!(
                "user={} tried {}{} without administrator permission",
                message.author_id, self.prefix, parsed.name
            );
            return self
                .platform
                .send_text(message.channel_id, NOT_ADMINISTRATOR)
                .await;
        }

        match command {
            BotCommand::Add => self.start_flow(FlowKind::Add, message).await,
            BotCommand::Remove => self.start_flow(FlowKind::Remove, message).await,
            BotCommand::Help => {
                self.platform
                    .send_text(message.channel_id, &help_text(&self.prefix))
                    .await
            }
        }
    }

    async fn start_flow(&self, kind: FlowKind, message: &InboundMessage) -> Result<()> {
        self.admin
            .invoke(Arc::clone(&self.platform), kind, message)
            .await
            .map(|_| ())
    }

    /// Sends the message text to every destination of its channel.
    async fn forward(&self, message: &InboundMessage) {
        let destinations = self.cache.lookup(&message.channel_id.to_string());
        if destinations.is_empty() {
            return;
        }
        if message.content.trim().is_empty() {
            debug!(
                "not relaying empty message from channel={}",
                message.channel_id
            );
            return;
        }

        for destination in destinations {
            let Some(channel) = self.platform.channel(destination).await else {
                debug!(
                    "skipping unresolvable relay destination channel={} source={}",
                    destination, message.channel_id
                );
                continue;
            };

            if let Err(err) = self.platform.send_text(channel.id, &message.content).await {
                warn!(
                    "failed to relay message from channel={} to channel={}: {err}",
                    message.channel_id, channel.id
                );
            }
        }
    }
}
