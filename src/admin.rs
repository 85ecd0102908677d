use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::parsers::MessageUtils;
use crate::platform::{ChannelRef, ChatPlatform, InboundMessage};
use crate::relay::{AddOutcome, RelayCache, RelayStore, RemoveOutcome, RemoveTarget, StoreError};

pub mod flow;
pub mod interactions;

pub use self::flow::{FlowInput, FlowKind, Interaction, Mutation, Step};
pub use self::interactions::{InteractionGuard, PendingInteractions, RouteOutcome};

use self::flow::{Expectation, TIMED_OUT_OR_ERROR};

pub const ALREADY_IN_PROGRESS: &str =
    "You already have a command in progress. Finish it or wait for it to time out.";
pub const NO_RELAYS_FOR_SOURCE: &str = "No relays found for that source channel.";
pub const RELAY_NOT_FOUND: &str = "That relay was not found.";
pub const REMOVED_EVERYTHING: &str = "Removed every channel connection.";

#[derive(Debug, Error)]
enum FlowError {
    #[error("no reply within {0:?}")]
    TimedOut(Duration),
    #[error("reply channel closed")]
    RepliesClosed,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("platform error: {0}")]
    Platform(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl FlowError {
    fn platform(err: anyhow::Error) -> Self {
        Self::Platform(err.into())
    }
}

/// Runs the interactive `add` and `remove` commands against the relay store.
///
/// Permission checks happen before [`RelayAdmin::invoke`]; see
/// [`crate::commands::BotCommand::requires_admin`].
pub struct RelayAdmin {
    store: Arc<RelayStore>,
    cache: Arc<RelayCache>,
    interactions: Arc<PendingInteractions>,
    reply_timeout: Duration,
}

impl RelayAdmin {
    pub fn new(
        store: Arc<RelayStore>,
        cache: Arc<RelayCache>,
        interactions: Arc<PendingInteractions>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            interactions,
            reply_timeout,
        }
    }

    pub fn interactions(&self) -> &Arc<PendingInteractions> {
        &self.interactions
    }

    /// Starts `kind` for the author of `message`. The author is marked busy
    /// before this returns; the conversation itself runs on a spawned task.
    pub async fn invoke(
        self: &Arc<Self>,
        platform: Arc<dyn ChatPlatform>,
        kind: FlowKind,
        message: &InboundMessage,
    ) -> anyhow::Result<Option<JoinHandle<()>>> {
        let Some(guard) = self
            .interactions
            .begin(message.author_id, message.channel_id)
        else {
            debug!(
                "user={} invoked {} while another command is pending",
                message.author_id, kind
            );
            platform
                .send_text(message.channel_id, ALREADY_IN_PROGRESS)
                .await?;
            return Ok(None);
        };

        let admin = Arc::clone(self);
        let (flow, prompt) = Interaction::start(kind, message.author_id, message.channel_id);
        Ok(Some(tokio::spawn(async move {
            admin.run(platform, flow, prompt, guard).await;
        })))
    }

    async fn run(
        &self,
        platform: Arc<dyn ChatPlatform>,
        mut flow: Interaction,
        prompt: &'static str,
        mut guard: InteractionGuard,
    ) {
        info!(
            "starting {} flow user={} channel={}",
            flow.kind(),
            flow.user_id(),
            flow.channel_id()
        );

        match self
            .converse(platform.as_ref(), &mut flow, &mut guard, prompt)
            .await
        {
            Ok(()) => debug!("{} flow finished user={}", flow.kind(), flow.user_id()),
            Err(err) => {
                match &err {
                    FlowError::TimedOut(_) => {
                        info!("{} flow timed out user={}", flow.kind(), flow.user_id())
                    }
                    _ => warn!("{} flow failed user={}: {}", flow.kind(), flow.user_id(), err),
                }
                if let Err(err) = platform
                    .send_text(flow.channel_id(), TIMED_OUT_OR_ERROR)
                    .await
                {
                    warn!("failed to report cancelled {} flow: {err}", flow.kind());
                }
            }
        }
    }

    async fn converse(
        &self,
        platform: &dyn ChatPlatform,
        flow: &mut Interaction,
        guard: &mut InteractionGuard,
        prompt: &'static str,
    ) -> Result<(), FlowError> {
        let channel_id = flow.channel_id();
        platform
            .send_text(channel_id, prompt)
            .await
            .map_err(FlowError::platform)?;

        loop {
            let reply = tokio::time::timeout(self.reply_timeout, guard.next_reply())
                .await
                .map_err(|_| FlowError::TimedOut(self.reply_timeout))?
                .ok_or(FlowError::RepliesClosed)?;

            let input = classify(platform, flow.expectation(), &reply).await;
            let message = match flow.advance(input) {
                Step::Prompt(next) => {
                    debug!("user={} flow now {:?}", flow.user_id(), flow.state());
                    platform
                        .send_text(channel_id, next)
                        .await
                        .map_err(FlowError::platform)?;
                    continue;
                }
                Step::Cancel(reason) => reason.to_string(),
                Step::Apply(mutation) => self.apply(mutation).await?,
            };

            platform
                .send_text(channel_id, &message)
                .await
                .map_err(FlowError::platform)?;
            return Ok(());
        }
    }

    /// Persists `mutation` on the blocking pool, refreshes the cache and
    /// returns the report for the user.
    async fn apply(&self, mutation: Mutation) -> Result<String, StoreError> {
        let report = match mutation {
            Mutation::AddRelay {
                source,
                destination,
            } => {
                let (source_key, dest_id) = (source.source_key(), destination.id);
                let (outcome, _) = self
                    .store
                    .run_blocking(move |store| store.add_destination(&source_key, dest_id))
                    .await?;
                match outcome {
                    AddOutcome::Added => format!(
                        "Relay added: messages from {} will be sent to {}",
                        source.mention(),
                        destination.mention()
                    ),
                    AddOutcome::AlreadyPresent => format!(
                        "Messages from {} are already sent to {}.",
                        source.mention(),
                        destination.mention()
                    ),
                }
            }
            Mutation::RemoveAll => {
                self.remove(RemoveTarget::All).await?;
                REMOVED_EVERYTHING.to_string()
            }
            Mutation::RemoveSource { source } => {
                match self.remove(RemoveTarget::Source(source.source_key())).await? {
                    RemoveOutcome::Removed => format!(
                        "Removed all relays from source channel {}.",
                        source.mention()
                    ),
                    RemoveOutcome::NotFound => NO_RELAYS_FOR_SOURCE.to_string(),
                }
            }
            Mutation::RemovePair {
                source,
                destination,
            } => {
                let target = RemoveTarget::Pair(source.source_key(), destination.id);
                match self.remove(target).await? {
                    RemoveOutcome::Removed => format!(
                        "Removed relay from {} to {}.",
                        source.mention(),
                        destination.mention()
                    ),
                    RemoveOutcome::NotFound => RELAY_NOT_FOUND.to_string(),
                }
            }
        };

        self.cache.refresh(&self.store).await;
        Ok(report)
    }

    async fn remove(&self, target: RemoveTarget) -> Result<RemoveOutcome, StoreError> {
        self.store
            .run_blocking(move |store| store.remove_entry(&target))
            .await
    }
}

async fn classify(
    platform: &dyn ChatPlatform,
    expectation: Expectation,
    reply: &InboundMessage,
) -> FlowInput {
    match expectation {
        Expectation::Confirmation => {
            FlowInput::Confirmation(MessageUtils::is_keyword(&reply.content, "y"))
        }
        Expectation::Channel { allow_all } => {
            if allow_all && MessageUtils::is_keyword(&reply.content, "all") {
                return FlowInput::All;
            }
            match resolve_channel(platform, reply).await {
                Some(channel) => FlowInput::Channel(channel),
                None => FlowInput::Unresolved,
            }
        }
        Expectation::Nothing => FlowInput::Unresolved,
    }
}

/// Picks the channel a reply refers to: the first mentioned channel the
/// platform can see, or, without mentions, a raw channel id.
pub async fn resolve_channel(
    platform: &dyn ChatPlatform,
    reply: &InboundMessage,
) -> Option<ChannelRef> {
    let channel = if reply.mentioned_channels.is_empty() {
        let channel_id = MessageUtils::parse_channel_id(&reply.content)?;
        platform.channel(channel_id).await
    } else {
        let mut found = None;
        for channel_id in &reply.mentioned_channels {
            if let Some(channel) = platform.channel(*channel_id).await {
                found = Some(channel);
                break;
            }
        }
        found
    }?;

    debug!(
        "reply resolved to channel {} ({})",
        channel.id,
        channel.name.as_deref().unwrap_or("unnamed")
    );
    Some(channel)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::flow::{
        ADD_DESTINATION_PROMPT, ADD_SOURCE_PROMPT, CONFIRM_REMOVE_ALL_PROMPT, INVALID_SOURCE,
        REMOVE_DESTINATION_PROMPT, REMOVE_SOURCE_PROMPT, TIMED_OUT_OR_ERROR, USER_ABORTED,
    };
    use super::{
        ALREADY_IN_PROGRESS, FlowKind, NO_RELAYS_FOR_SOURCE, PendingInteractions,
        RELAY_NOT_FOUND, RelayAdmin, resolve_channel,
    };
    use crate::platform::ChatPlatform;
    use crate::relay::{RelayCache, RelayStore};
    use crate::testing::{FakePlatform, admin_message, message};

    const ADMIN: u64 = 7;
    const COMMAND_CHANNEL: u64 = 100;
    const GENERAL: u64 = 1;
    const LOGS: u64 = 2;

    struct Harness {
        _dir: TempDir,
        store: Arc<RelayStore>,
        cache: Arc<RelayCache>,
        admin: Arc<RelayAdmin>,
        platform: Arc<FakePlatform>,
    }

    impl Harness {
        fn new(reply_timeout: Duration) -> Self {
            let dir = tempfile::tempdir().expect("temp dir");
            let store = Arc::new(RelayStore::new(dir.path().join("config.json")));
            let cache = Arc::new(RelayCache::new());
            let admin = Arc::new(RelayAdmin::new(
                store.clone(),
                cache.clone(),
                Arc::new(PendingInteractions::new()),
                reply_timeout,
            ));
            let platform = Arc::new(
                FakePlatform::new()
                    .with_channel(GENERAL, "general")
                    .with_channel(LOGS, "logs")
                    .with_channel(COMMAND_CHANNEL, "bot-commands"),
            );
            Self {
                _dir: dir,
                store,
                cache,
                admin,
                platform,
            }
        }

        async fn start(&self, kind: FlowKind) -> tokio::task::JoinHandle<()> {
            let platform: Arc<dyn ChatPlatform> = self.platform.clone();
            self.admin
                .invoke(platform, kind, &admin_message(ADMIN, COMMAND_CHANNEL, "<cmd"))
                .await
                .expect("invoke")
                .expect("flow should start")
        }

        fn reply(&self, content: &str) {
            self.admin
                .interactions()
                .route(&message(ADMIN, COMMAND_CHANNEL, content));
        }

        async fn expect_sent(&self, expected: &str) {
            let (channel_id, text) = self.platform.next_sent().await;
            assert_eq!(channel_id, COMMAND_CHANNEL);
            assert_eq!(text, expected);
        }
    }

    #[tokio::test]
    async fn add_flow_persists_and_refreshes_cache() {
        let h = Harness::new(Duration::from_secs(5));
        let handle = h.start(FlowKind::Add).await;

        h.expect_sent(ADD_SOURCE_PROMPT).await;
        h.reply("<#1>");
        h.expect_sent(ADD_DESTINATION_PROMPT).await;
        h.reply("2");
        h.expect_sent("Relay added: messages from <#1> will be sent to <#2>")
            .await;
        handle.await.expect("flow task");

        assert_eq!(h.store.load().destinations("1"), &[LOGS]);
        assert_eq!(h.cache.lookup("1"), vec![LOGS]);
        assert!(!h.admin.interactions().is_busy(ADMIN));
    }

    #[tokio::test]
    async fn add_flow_reports_existing_relay() {
        let h = Harness::new(Duration::from_secs(5));
        h.store.add_destination("1", LOGS).expect("seed");

        let handle = h.start(FlowKind::Add).await;
        h.reply("1");
        h.reply("<#2>");
        handle.await.expect("flow task");

        let sent = h.platform.sent_to(COMMAND_CHANNEL);
        assert_eq!(
            sent.last().map(String::as_str),
            Some("Messages from <#1> are already sent to <#2>.")
        );
        assert_eq!(h.store.load().destinations("1"), &[LOGS]);
    }

    #[tokio::test]
    async fn add_flow_cancels_on_unknown_channel() {
        let h = Harness::new(Duration::from_secs(5));
        let handle = h.start(FlowKind::Add).await;

        h.expect_sent(ADD_SOURCE_PROMPT).await;
        h.reply("999");
        h.expect_sent(INVALID_SOURCE).await;
        handle.await.expect("flow task");

        assert!(h.store.load().is_empty());
        assert!(!h.admin.interactions().is_busy(ADMIN));
    }

    #[tokio::test]
    async fn add_flow_times_out_without_mutation() {
        let h = Harness::new(Duration::from_millis(50));
        let handle = h.start(FlowKind::Add).await;

        h.expect_sent(ADD_SOURCE_PROMPT).await;
        h.expect_sent(TIMED_OUT_OR_ERROR).await;
        handle.await.expect("flow task");

        assert!(h.store.load().is_empty());
        assert!(!h.admin.interactions().is_busy(ADMIN));

        let again = h.start(FlowKind::Add).await;
        h.expect_sent(ADD_SOURCE_PROMPT).await;
        again.abort();
    }

    #[tokio::test]
    async fn timeout_after_first_step_keeps_mapping_untouched() {
        let h = Harness::new(Duration::from_millis(50));
        let handle = h.start(FlowKind::Add).await;

        h.reply("1");
        handle.await.expect("flow task");

        let sent = h.platform.sent_to(COMMAND_CHANNEL);
        assert_eq!(
            sent,
            vec![
                ADD_SOURCE_PROMPT.to_string(),
                ADD_DESTINATION_PROMPT.to_string(),
                TIMED_OUT_OR_ERROR.to_string(),
            ]
        );
        assert!(h.store.load().is_empty());
    }

    #[tokio::test]
    async fn remove_all_with_confirmation_clears_everything() {
        let h = Harness::new(Duration::from_secs(5));
        h.store.add_destination("1", LOGS).expect("seed");
        h.cache.refresh(&h.store).await;

        let handle = h.start(FlowKind::Remove).await;
        h.expect_sent(REMOVE_SOURCE_PROMPT).await;
        h.reply("ALL");
        h.expect_sent(CONFIRM_REMOVE_ALL_PROMPT).await;
        h.reply("y");
        h.expect_sent("Removed every channel connection.").await;
        handle.await.expect("flow task");

        assert!(h.store.load().is_empty());
        assert!(h.cache.lookup("1").is_empty());
    }

    #[tokio::test]
    async fn remove_all_without_confirmation_aborts() {
        let h = Harness::new(Duration::from_secs(5));
        h.store.add_destination("1", LOGS).expect("seed");

        let handle = h.start(FlowKind::Remove).await;
        h.reply("all");
        h.reply("nope");
        handle.await.expect("flow task");

        assert_eq!(
            h.platform.sent_to(COMMAND_CHANNEL).last().map(String::as_str),
            Some(USER_ABORTED)
        );
        assert_eq!(h.store.load().destinations("1"), &[LOGS]);
    }

    #[tokio::test]
    async fn remove_whole_source() {
        let h = Harness::new(Duration::from_secs(5));
        h.store.add_destination("1", LOGS).expect("seed");
        h.store.add_destination("1", COMMAND_CHANNEL).expect("seed");

        let handle = h.start(FlowKind::Remove).await;
        h.expect_sent(REMOVE_SOURCE_PROMPT).await;
        h.reply("<#1>");
        h.expect_sent(REMOVE_DESTINATION_PROMPT).await;
        h.reply("all");
        h.expect_sent("Removed all relays from source channel <#1>.")
            .await;
        handle.await.expect("flow task");

        assert!(h.store.load().destinations("1").is_empty());
    }

    #[tokio::test]
    async fn remove_unknown_source_reports_not_found() {
        let h = Harness::new(Duration::from_secs(5));

        let handle = h.start(FlowKind::Remove).await;
        h.reply("1");
        h.reply("all");
        handle.await.expect("flow task");

        assert_eq!(
            h.platform.sent_to(COMMAND_CHANNEL).last().map(String::as_str),
            Some(NO_RELAYS_FOR_SOURCE)
        );
    }

    #[tokio::test]
    async fn remove_single_relay_and_missing_relay() {
        let h = Harness::new(Duration::from_secs(5));
        h.store.add_destination("1", LOGS).expect("seed");

        let handle = h.start(FlowKind::Remove).await;
        h.reply("1");
        h.reply("<#100>");
        handle.await.expect("flow task");
        assert_eq!(
            h.platform.sent_to(COMMAND_CHANNEL).last().map(String::as_str),
            Some(RELAY_NOT_FOUND)
        );

        let handle = h.start(FlowKind::Remove).await;
        h.reply("1");
        h.reply("2");
        handle.await.expect("flow task");
        assert_eq!(
            h.platform.sent_to(COMMAND_CHANNEL).last().map(String::as_str),
            Some("Removed relay from <#1> to <#2>.")
        );
        assert!(h.store.load().is_empty());
    }

    #[tokio::test]
    async fn second_invocation_does_not_disturb_the_first() {
        let h = Harness::new(Duration::from_secs(5));
        let handle = h.start(FlowKind::Add).await;
        h.expect_sent(ADD_SOURCE_PROMPT).await;

        let platform: Arc<dyn ChatPlatform> = h.platform.clone();
        let second = h
            .admin
            .invoke(
                platform,
                FlowKind::Remove,
                &admin_message(ADMIN, COMMAND_CHANNEL, "<remove"),
            )
            .await
            .expect("invoke");
        assert!(second.is_none());
        h.expect_sent(ALREADY_IN_PROGRESS).await;

        h.reply("1");
        h.expect_sent(ADD_DESTINATION_PROMPT).await;
        h.reply("2");
        handle.await.expect("flow task");
        assert_eq!(h.store.load().destinations("1"), &[LOGS]);
    }

    #[tokio::test]
    async fn resolve_prefers_first_visible_mention() {
        let platform = FakePlatform::new().with_channel(GENERAL, "general");

        let reply = message(ADMIN, COMMAND_CHANNEL, "<#555> <#1>");
        let channel = resolve_channel(&platform, &reply).await.expect("resolved");
        assert_eq!(channel.id, GENERAL);

        let reply = message(ADMIN, COMMAND_CHANNEL, "<#555>");
        assert!(resolve_channel(&platform, &reply).await.is_none());

        let reply = message(ADMIN, COMMAND_CHANNEL, "general");
        assert!(resolve_channel(&platform, &reply).await.is_none());
    }
}
