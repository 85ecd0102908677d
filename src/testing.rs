use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::parsers::MessageUtils;
use crate::platform::{ChannelRef, ChatPlatform, InboundMessage};

/// In-memory platform that records every message the bot sends.
pub(crate) struct FakePlatform {
    channels: Mutex<HashMap<u64, ChannelRef>>,
    failing: Mutex<HashSet<u64>>,
    log: Mutex<Vec<(u64, String)>>,
    sent_tx: mpsc::UnboundedSender<(u64, String)>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(u64, String)>>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        Self {
            channels: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            log: Mutex::new(Vec::new()),
            sent_tx,
            sent_rx: tokio::sync::Mutex::new(sent_rx),
        }
    }

    pub(crate) fn with_channel(self, id: u64, name: &str) -> Self {
        self.channels.lock().insert(id, ChannelRef::named(id, name));
        self
    }

    pub(crate) fn remove_channel(&self, id: u64) {
        self.channels.lock().remove(&id);
    }

    pub(crate) fn fail_sends_to(&self, id: u64) {
        self.failing.lock().insert(id);
    }

    pub(crate) fn sent(&self) -> Vec<(u64, String)> {
        self.log.lock().clone()
    }

    pub(crate) fn sent_to(&self, channel_id: u64) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|(id, _)| *id == channel_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Waits for the next outgoing message, failing the test after two seconds.
    pub(crate) async fn next_sent(&self) -> (u64, String) {
        let mut rx = self.sent_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for the bot to send a message")
            .expect("sent channel closed")
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn channel(&self, channel_id: u64) -> Option<ChannelRef> {
        self.channels.lock().get(&channel_id).cloned()
    }

    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()> {
        if self.failing.lock().contains(&channel_id) {
            return Err(anyhow!("channel {} rejected the message", channel_id));
        }
        self.log.lock().push((channel_id, text.to_string()));
        let _ = self.sent_tx.send((channel_id, text.to_string()));
        Ok(())
    }
}

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Builds a message with a fresh id, larger than every id built before it.
pub(crate) fn message(author_id: u64, channel_id: u64, content: &str) -> InboundMessage {
    InboundMessage {
        author_id,
        is_bot: false,
        author_is_admin: false,
        channel_id,
        message_id: NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed),
        content: content.to_string(),
        mentioned_channels: MessageUtils::extract_channel_mentions(content),
    }
}

pub(crate) fn admin_message(author_id: u64, channel_id: u64, content: &str) -> InboundMessage {
    InboundMessage {
        author_is_admin: true,
        ..message(author_id, channel_id, content)
    }
}
