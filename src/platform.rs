use anyhow::Result;
use async_trait::async_trait;

/// A channel the platform knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: u64,
    pub name: Option<String>,
}

impl ChannelRef {
    pub fn new(id: u64) -> Self {
        Self { id, name: None }
    }

    pub fn named(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }

    /// Key under which this channel appears as a relay source.
    pub fn source_key(&self) -> String {
        self.id.to_string()
    }

    pub fn mention(&self) -> String {
        format!("<#{}>", self.id)
    }
}

/// An incoming chat message, already stripped of platform-specific types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub author_id: u64,
    pub is_bot: bool,
    pub author_is_admin: bool,
    pub channel_id: u64,
    /// Platform message id; later messages carry larger ids.
    pub message_id: u64,
    pub content: String,
    /// Channel ids mentioned in `content`, in order of appearance.
    pub mentioned_channels: Vec<u64>,
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Looks a channel up by id. `None` when it does not exist or the bot
    /// cannot see it.
    async fn channel(&self, channel_id: u64) -> Option<ChannelRef>;

    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()>;
}
