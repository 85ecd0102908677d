use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::platform::InboundMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The author has no pending interaction; dispatch normally.
    Idle,
    /// Handed to the author's pending interaction.
    Delivered,
    /// The author is busy but wrote somewhere else, or the reply is older
    /// than one already delivered; the message is dropped.
    Suppressed,
}

struct PendingEntry {
    token: u64,
    channel_id: u64,
    /// Newest message id handed to the interaction so far.
    last_message_id: u64,
    replies: mpsc::UnboundedSender<InboundMessage>,
}

/// Users currently inside an interactive command, keyed by user id.
///
/// An entry exists exactly as long as its [`InteractionGuard`] is alive.
#[derive(Default)]
pub struct PendingInteractions {
    entries: Mutex<HashMap<u64, PendingEntry>>,
    next_token: AtomicU64,
}

impl PendingInteractions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `user_id` busy in `channel_id`. Returns `None` if the user
    /// already has an interaction pending.
    pub fn begin(self: &Arc<Self>, user_id: u64, channel_id: u64) -> Option<InteractionGuard> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&user_id) {
            return None;
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        entries.insert(
            user_id,
            PendingEntry {
                token,
                channel_id,
                last_message_id: 0,
                replies: tx,
            },
        );
        debug!("user={} is now busy in channel={}", user_id, channel_id);

        Some(InteractionGuard {
            registry: Arc::clone(self),
            user_id,
            token,
            replies: rx,
        })
    }

    #[cfg(test)]
    pub fn is_busy(&self, user_id: u64) -> bool {
        self.entries.lock().contains_key(&user_id)
    }

    /// Hands `message` to its author's pending interaction, if any.
    ///
    /// Gateway events are handled on separate tasks, so two quick replies can
    /// arrive here out of order. Message ids grow over time; a reply older
    /// than one already delivered is dropped rather than fed to the flow late.
    pub fn route(&self, message: &InboundMessage) -> RouteOutcome {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&message.author_id) else {
            return RouteOutcome::Idle;
        };

        if entry.channel_id != message.channel_id {
            return RouteOutcome::Suppressed;
        }

        if message.message_id < entry.last_message_id {
            debug!(
                "dropping stale reply message={} from user={}",
                message.message_id, message.author_id
            );
            return RouteOutcome::Suppressed;
        }
        entry.last_message_id = message.message_id;

        match entry.replies.send(message.clone()) {
            Ok(()) => RouteOutcome::Delivered,
            Err(_) => RouteOutcome::Suppressed,
        }
    }

    fn release(&self, user_id: u64, token: u64) {
        let mut entries = self.entries.lock();
        if entries.get(&user_id).is_some_and(|entry| entry.token == token) {
            entries.remove(&user_id);
            debug!("user={} is no longer busy", user_id);
        }
    }
}

/// Keeps a user marked busy; dropping it clears the mark on every exit path.
pub struct InteractionGuard {
    registry: Arc<PendingInteractions>,
    user_id: u64,
    token: u64,
    replies: mpsc::UnboundedReceiver<InboundMessage>,
}

impl InteractionGuard {
    pub async fn next_reply(&mut self) -> Option<InboundMessage> {
        self.replies.recv().await
    }
}

impl Drop for InteractionGuard {
    fn drop(&mut self) {
        self.registry.release(self.user_id, self.token);
    }
}
