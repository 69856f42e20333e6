//! Event model — the immutable records that flow through the event stream.
//!
//! Every component communicates exclusively by appending events. An event
//! is created once at append time (when it receives its id and timestamp)
//! and is never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::safety::RiskLevel;
use crate::state::ControllerStatus;

/// Monotonic, per-stream event identifier. The first event of a stream is `#0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl EventId {
    pub const ROOT: EventId = EventId(0);

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse classification of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Action,
    Observation,
    UserMessage,
    SystemNotice,
    Summary,
}

/// Which component produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Agent,
    User,
    Runtime,
    Controller,
    Condenser,
}

/// An immutable, ordered record of something that happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,

    /// The event this one responds to (`None` for root events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<EventId>,

    pub payload: EventPayload,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Ordering key inside the active view.
    ///
    /// Summaries sit where the span they replaced used to start, so their
    /// key is the anchor recorded at condensation time.
    pub fn view_key(&self) -> EventId {
        match &self.payload {
            EventPayload::Summary(summary) => summary.anchor,
            _ => self.id,
        }
    }

    pub fn as_action(&self) -> Option<&ActionEvent> {
        match &self.payload {
            EventPayload::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn as_observation(&self) -> Option<&Observation> {
        match &self.payload {
            EventPayload::Observation(obs) => Some(obs),
            _ => None,
        }
    }

    pub fn as_summary(&self) -> Option<&Summary> {
        match &self.payload {
            EventPayload::Summary(summary) => Some(summary),
            _ => None,
        }
    }

    /// Plain text rendering, used for size estimation and summaries.
    pub fn render(&self) -> String {
        match &self.payload {
            EventPayload::Action(a) => format!("action {}: {}", self.id, a.action.describe()),
            EventPayload::Observation(o) => format!("observation {}: {}", self.id, o.describe()),
            EventPayload::UserMessage { content } => format!("user {}: {content}", self.id),
            EventPayload::Confirmation(c) => format!(
                "user {}: {} {}",
                self.id,
                if c.approved { "approved" } else { "rejected" },
                c.action
            ),
            EventPayload::Notice(n) => format!("notice {}: {}", self.id, n.describe()),
            EventPayload::Summary(s) => format!("summary {}: {}", self.id, s.text),
        }
    }
}

/// Kind-specific event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Action(ActionEvent),
    Observation(Observation),
    UserMessage { content: String },
    /// A front-end answer to an action awaiting confirmation.
    Confirmation(Confirmation),
    Notice(Notice),
    Summary(Summary),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Action(_) => EventKind::Action,
            Self::Observation(_) => EventKind::Observation,
            Self::UserMessage { .. } | Self::Confirmation(_) => EventKind::UserMessage,
            Self::Notice(_) => EventKind::SystemNotice,
            Self::Summary(_) => EventKind::Summary,
        }
    }
}

/// An operation the agent wants performed in the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Execute a shell command.
    Run { command: String },
    /// Read a file.
    Read { path: String },
    /// Write (create or overwrite) a file.
    Write { path: String, content: String },
    /// Fetch a URL.
    Browse { url: String },
    /// Ask the user something and wait for their reply.
    AskUser { message: String },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Browse { .. } => "browse",
            Self::AskUser { .. } => "ask_user",
        }
    }

    /// Whether this action suspends the loop until a user message arrives
    /// instead of being dispatched to the runtime.
    pub fn awaits_user(&self) -> bool {
        matches!(self, Self::AskUser { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Run { command } => format!("run `{command}`"),
            Self::Read { path } => format!("read {path}"),
            Self::Write { path, content } => format!("write {path} ({} bytes)", content.len()),
            Self::Browse { url } => format!("browse {url}"),
            Self::AskUser { message } => format!("ask user: {message}"),
        }
    }
}

/// Where an action stands with respect to the safety gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateStatus {
    Allowed,
    /// Provisional: recorded, but not dispatched until a confirmation arrives.
    AwaitingConfirmation,
    Rejected { reason: String },
}

/// Payload of an `Action` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub action: Action,
    pub gate: GateStatus,
    #[serde(default)]
    pub risk: RiskLevel,
}

/// Who refused an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionOrigin {
    SafetyGate,
    User,
}

/// The result of an executed (or refused) action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observation {
    Output {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    Failure {
        reason: String,
        fatal: bool,
    },
    Rejected {
        reason: String,
        origin: RejectionOrigin,
    },
}

impl Observation {
    pub fn output(content: impl Into<String>) -> Self {
        Self::Output {
            content: content.into(),
            exit_code: None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Output { content, exit_code: Some(code) } => format!("[exit {code}] {content}"),
            Self::Output { content, .. } => content.clone(),
            Self::Failure { reason, fatal: true } => format!("fatal failure: {reason}"),
            Self::Failure { reason, .. } => format!("failure: {reason}"),
            Self::Rejected { reason, origin: RejectionOrigin::SafetyGate } => {
                format!("blocked by safety gate: {reason}")
            }
            Self::Rejected { reason, origin: RejectionOrigin::User } => {
                format!("rejected by user: {reason}")
            }
        }
    }
}

/// A front-end decision on a provisional action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub action: EventId,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Controller bookkeeping recorded in the log so replay is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    StatusChanged {
        status: ControllerStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// The agent could not produce a decision; counts as an iteration.
    AgentFailed { reason: String },
    Info { message: String },
}

impl Notice {
    pub fn describe(&self) -> String {
        match self {
            Self::StatusChanged { status, reason: Some(reason) } => format!("{status}: {reason}"),
            Self::StatusChanged { status, reason: None } => status.to_string(),
            Self::AgentFailed { reason } => format!("agent failed: {reason}"),
            Self::Info { message } => message.clone(),
        }
    }
}

/// Placeholder or model-written summary replacing a set of condensed events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Ids removed from the active view, ascending.
    pub covered: Vec<EventId>,
    /// View position: the smallest view key among the covered events.
    pub anchor: EventId,
    pub text: String,
    pub strategy: String,
}

impl Summary {
    pub fn count(&self) -> usize {
        self.covered.len()
    }

    pub fn first(&self) -> Option<EventId> {
        self.covered.first().copied()
    }

    pub fn last(&self) -> Option<EventId> {
        self.covered.last().copied()
    }
}

/// An event before the stream has assigned its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub source: EventSource,
    pub cause: Option<EventId>,
    pub payload: EventPayload,
}

impl EventDraft {
    pub fn action(cause: Option<EventId>, action: Action, gate: GateStatus, risk: RiskLevel) -> Self {
        Self {
            source: EventSource::Agent,
            cause,
            payload: EventPayload::Action(ActionEvent { action, gate, risk }),
        }
    }

    pub fn observation(action: EventId, source: EventSource, observation: Observation) -> Self {
        Self {
            source,
            cause: Some(action),
            payload: EventPayload::Observation(observation),
        }
    }

    pub fn user_message(content: impl Into<String>) -> Self {
        Self {
            source: EventSource::User,
            cause: None,
            payload: EventPayload::UserMessage {
                content: content.into(),
            },
        }
    }

    pub fn confirmation(action: EventId, approved: bool, reason: Option<String>) -> Self {
        Self {
            source: EventSource::User,
            cause: Some(action),
            payload: EventPayload::Confirmation(Confirmation {
                action,
                approved,
                reason,
            }),
        }
    }

    pub fn notice(cause: Option<EventId>, notice: Notice) -> Self {
        Self {
            source: EventSource::Controller,
            cause,
            payload: EventPayload::Notice(notice),
        }
    }

    pub fn status(status: ControllerStatus, reason: Option<String>) -> Self {
        Self::notice(None, Notice::StatusChanged { status, reason })
    }

    pub fn summary(summary: Summary) -> Self {
        Self {
            source: EventSource::Condenser,
            cause: None,
            payload: EventPayload::Summary(summary),
        }
    }

    /// Seal the draft into an immutable event.
    pub fn into_event(self, id: EventId, timestamp: DateTime<Utc>) -> Event {
        Event {
            id,
            timestamp,
            source: self.source,
            cause: self.cause,
            payload: self.payload,
        }
    }
}
