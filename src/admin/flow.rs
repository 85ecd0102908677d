use std::fmt;

use crate::platform::ChannelRef;

pub const ADD_SOURCE_PROMPT: &str =
    "Please mention the **source** channel (e.g. #general) or type channel ID:";
pub const ADD_DESTINATION_PROMPT: &str =
    "Now please mention the **destination** channel or type channel ID:";
pub const REMOVE_SOURCE_PROMPT: &str = "Type `all` to remove every channel connection, or mention a **source** channel to remove (e.g. #general) or type channel ID:";
pub const REMOVE_DESTINATION_PROMPT: &str =
    "Type `all` to remove the entire source relay, or mention a **destination** channel to remove:";
pub const CONFIRM_REMOVE_ALL_PROMPT: &str = "Are you sure you want to delete ***__EVERY SINGLE__*** channel connection? This is irreversible! (Y/N)";

pub const INVALID_SOURCE: &str = "Invalid source channel. Command cancelled.";
pub const INVALID_DESTINATION: &str = "Invalid destination channel. Command cancelled.";
pub const SAME_CHANNEL: &str =
    "The source and destination must be different channels. Command cancelled.";
pub const USER_ABORTED: &str = "User aborted. Command cancelled.";
pub const TIMED_OUT_OR_ERROR: &str = "Timed out or error occurred, command cancelled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Add,
    Remove,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::Add => f.write_str("add"),
            FlowKind::Remove => f.write_str("remove"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    AwaitingSource,
    AwaitingDestination { source: ChannelRef },
    AwaitingConfirmation,
    Done,
}

/// How the next reply should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Channel { allow_all: bool },
    Confirmation,
    Nothing,
}

/// A reply after it has been classified against the current [`Expectation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowInput {
    All,
    Channel(ChannelRef),
    Unresolved,
    Confirmation(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    AddRelay {
        source: ChannelRef,
        destination: ChannelRef,
    },
    RemoveAll,
    RemoveSource {
        source: ChannelRef,
    },
    RemovePair {
        source: ChannelRef,
        destination: ChannelRef,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send this prompt and wait for another reply.
    Prompt(&'static str),
    /// The flow is complete; apply the mutation and report the result.
    Apply(Mutation),
    /// The flow ends without touching the relay mapping.
    Cancel(&'static str),
}

/// One user's walk through an add or remove conversation.
///
/// Pure state: resolving replies, waiting and persisting are left to the
/// caller, which feeds classified [`FlowInput`]s into [`Interaction::advance`].
#[derive(Debug, Clone)]
pub struct Interaction {
    kind: FlowKind,
    user_id: u64,
    channel_id: u64,
    state: FlowState,
}

impl Interaction {
    /// Creates the interaction together with its opening prompt.
    pub fn start(kind: FlowKind, user_id: u64, channel_id: u64) -> (Self, &'static str) {
        let prompt = match kind {
            FlowKind::Add => ADD_SOURCE_PROMPT,
            FlowKind::Remove => REMOVE_SOURCE_PROMPT,
        };
        let interaction = Self {
            kind,
            user_id,
            channel_id,
            state: FlowState::AwaitingSource,
        };
        (interaction, prompt)
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn channel_id(&self) -> u64 {
        self.channel_id
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn expectation(&self) -> Expectation {
        match (&self.state, self.kind) {
            (FlowState::AwaitingSource, FlowKind::Add)
            | (FlowState::AwaitingDestination { .. }, FlowKind::Add) => {
                Expectation::Channel { allow_all: false }
            }
            (FlowState::AwaitingSource, FlowKind::Remove)
            | (FlowState::AwaitingDestination { .. }, FlowKind::Remove) => {
                Expectation::Channel { allow_all: true }
            }
            (FlowState::AwaitingConfirmation, _) => Expectation::Confirmation,
            (FlowState::Done, _) => Expectation::Nothing,
        }
    }

    pub fn advance(&mut self, input: FlowInput) -> Step {
        let state = std::mem::replace(&mut self.state, FlowState::Done);

        match (self.kind, state, input) {
            (FlowKind::Add, FlowState::AwaitingSource, FlowInput::Channel(source)) => {
                self.state = FlowState::AwaitingDestination { source };
                Step::Prompt(ADD_DESTINATION_PROMPT)
            }
            (FlowKind::Remove, FlowState::AwaitingSource, FlowInput::Channel(source)) => {
                self.state = FlowState::AwaitingDestination { source };
                Step::Prompt(REMOVE_DESTINATION_PROMPT)
            }
            (FlowKind::Remove, FlowState::AwaitingSource, FlowInput::All) => {
                self.state = FlowState::AwaitingConfirmation;
                Step::Prompt(CONFIRM_REMOVE_ALL_PROMPT)
            }
            (_, FlowState::AwaitingSource, _) => Step::Cancel(INVALID_SOURCE),

            (
                FlowKind::Add,
                FlowState::AwaitingDestination { source },
                FlowInput::Channel(destination),
            ) => {
                if source.id == destination.id {
                    Step::Cancel(SAME_CHANNEL)
                } else {
                    Step::Apply(Mutation::AddRelay {
                        source,
                        destination,
                    })
                }
            }
            (
                FlowKind::Remove,
                FlowState::AwaitingDestination { source },
                FlowInput::Channel(destination),
            ) => Step::Apply(Mutation::RemovePair {
                source,
                destination,
            }),
            (FlowKind::Remove, FlowState::AwaitingDestination { source }, FlowInput::All) => {
                Step::Apply(Mutation::RemoveSource { source })
            }
            (_, FlowState::AwaitingDestination { .. }, _) => Step::Cancel(INVALID_DESTINATION),

            (_, FlowState::AwaitingConfirmation, FlowInput::Confirmation(true)) => {
                Step::Apply(Mutation::RemoveAll)
            }
            (_, FlowState::AwaitingConfirmation, _) => Step::Cancel(USER_ABORTED),

            (_, FlowState::Done, _) => Step::Cancel(TIMED_OUT_OR_ERROR),
        }
    }
}
