//! Session state — owned by the controller, rebuilt by folding events.
//!
//! [`State::apply`] is the only way state changes. The controller appends
//! events and folds them back in id order, so replaying a persisted log
//! through [`State::replay`] yields exactly the state the live session had.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::event::{Event, EventId, EventPayload, GateStatus, Notice};
use crate::token::estimate_events_tokens;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Controller state machine states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerStatus {
    #[default]
    Running,
    AwaitingConfirmation,
    AwaitingUserInput,
    Error,
    Finished,
    Stopped,
}

impl ControllerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Finished | Self::Stopped)
    }

    pub fn is_suspended(self) -> bool {
        matches!(self, Self::AwaitingConfirmation | Self::AwaitingUserInput)
    }
}

impl std::fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            Self::AwaitingUserInput => "AWAITING_USER_INPUT",
            Self::Error => "ERROR",
            Self::Finished => "FINISHED",
            Self::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// How large the active view may grow before condensation triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "limit", rename_all = "snake_case")]
pub enum Budget {
    Events(usize),
    Tokens(usize),
    Unbounded,
}

impl Budget {
    /// Size of a view in this budget's unit.
    pub fn measure<'a>(&self, events: impl IntoIterator<Item = &'a Event>) -> usize {
        match self {
            Self::Events(_) | Self::Unbounded => events.into_iter().count(),
            Self::Tokens(_) => estimate_events_tokens(events),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Events(limit) | Self::Tokens(limit) => Some(*limit),
            Self::Unbounded => None,
        }
    }

    /// Whether `size` is over the budget plus `slack`.
    pub fn exceeded_by(&self, size: usize, slack: usize) -> bool {
        self.limit()
            .is_some_and(|limit| size > limit.saturating_add(slack))
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::Events(120)
    }
}

/// Fixed limits a state is created with; not derived from events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_iterations: u32,
    pub budget: Budget,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            budget: Budget::default(),
        }
    }
}

/// How a provisional action was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Approved,
    Rejected { reason: Option<String> },
}

/// An action recorded as awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub action: EventId,
    pub resolution: Option<Resolution>,
}

/// Mutable per-session state.
#[derive(Debug, Clone)]
pub struct State {
    pub session_id: SessionId,

    /// The active view: event ids ordered by view key.
    pub history: Vec<EventId>,

    /// Completed steps.
    pub iteration: u32,

    pub max_iterations: u32,
    pub budget: Budget,
    pub status: ControllerStatus,
    pub last_error: Option<String>,

    /// Action awaiting (or just answered by) a confirmation.
    pub pending: Option<Pending>,

    /// Action dispatched to the runtime whose observation is not yet folded.
    pub in_flight: Option<EventId>,

    /// Highest event id folded so far.
    pub last_applied: Option<EventId>,

    /// Covered id → summary id that absorbed it.
    redirects: BTreeMap<EventId, EventId>,

    /// View key of every event in `history`.
    keys: HashMap<EventId, EventId>,
}

impl State {
    pub fn new(session_id: SessionId, limits: Limits) -> Self {
        Self {
            session_id,
            history: Vec::new(),
            iteration: 0,
            max_iterations: limits.max_iterations,
            budget: limits.budget,
            status: ControllerStatus::Running,
            last_error: None,
            pending: None,
            in_flight: None,
            last_applied: None,
            redirects: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }

    /// Rebuild state by folding events in id order.
    pub fn replay<'a>(
        session_id: SessionId,
        limits: Limits,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> Self {
        let mut state = Self::new(session_id, limits);
        for event in events {
            state.apply(event);
        }
        state
    }

    /// The id the next folded event must exceed.
    pub fn next_expected(&self) -> EventId {
        self.last_applied.map_or(EventId::ROOT, EventId::next)
    }

    /// Fold one event. Returns `false` if it was already applied.
    pub fn apply(&mut self, event: &Event) -> bool {
        if self.last_applied.is_some_and(|last| event.id <= last) {
            return false;
        }
        self.last_applied = Some(event.id);

        match &event.payload {
            EventPayload::Action(action) => {
                self.insert(event);
                match &action.gate {
                    GateStatus::AwaitingConfirmation => {
                        self.pending = Some(Pending {
                            action: event.id,
                            resolution: None,
                        });
                        self.status = ControllerStatus::AwaitingConfirmation;
                    }
                    GateStatus::Allowed if action.action.awaits_user() => {
                        self.iteration += 1;
                        self.status = ControllerStatus::AwaitingUserInput;
                    }
                    GateStatus::Allowed => self.in_flight = Some(event.id),
                    GateStatus::Rejected { .. } => {}
                }
            }
            EventPayload::Observation(_) => {
                self.insert(event);
                self.iteration += 1;
                if event.cause.is_some() && self.in_flight == event.cause {
                    self.in_flight = None;
                }
                if self
                    .pending
                    .as_ref()
                    .is_some_and(|p| Some(p.action) == event.cause)
                {
                    self.pending = None;
                }
            }
            EventPayload::UserMessage { .. } => {
                self.insert(event);
                if self.status == ControllerStatus::AwaitingUserInput {
                    self.status = ControllerStatus::Running;
                }
            }
            EventPayload::Confirmation(confirmation) => {
                let matches = self.status == ControllerStatus::AwaitingConfirmation
                    && self
                        .pending
                        .as_ref()
                        .is_some_and(|p| p.action == confirmation.action && p.resolution.is_none());
                if !matches {
                    debug!(event_id = %event.id, action = %confirmation.action, "Ignoring confirmation for a non-pending action");
                    return true;
                }
                self.insert(event);
                if let Some(pending) = self.pending.as_mut() {
                    pending.resolution = Some(if confirmation.approved {
                        Resolution::Approved
                    } else {
                        Resolution::Rejected {
                            reason: confirmation.reason.clone(),
                        }
                    });
                }
                self.status = ControllerStatus::Running;
            }
            EventPayload::Notice(Notice::StatusChanged { status, reason }) => {
                self.status = *status;
                self.last_error = match status {
                    ControllerStatus::Error => reason.clone(),
                    _ => None,
                };
            }
            EventPayload::Notice(Notice::AgentFailed { .. }) => {
                self.insert(event);
                self.iteration += 1;
            }
            EventPayload::Notice(Notice::Info { .. }) => self.insert(event),
            EventPayload::Summary(summary) => {
                for covered in &summary.covered {
                    self.redirects.insert(*covered, event.id);
                    self.keys.remove(covered);
                }
                self.history.retain(|id| !summary.covered.contains(id));
                self.insert(event);
            }
        }
        true
    }

    /// Insert an event into the active view at its view-key position.
    fn insert(&mut self, event: &Event) {
        let key = event.view_key();
        let position = self
            .history
            .partition_point(|id| self.keys.get(id).copied().unwrap_or(*id) <= key);
        self.history.insert(position, event.id);
        self.keys.insert(event.id, key);
    }

    /// Resolve a causal reference through any summaries that absorbed it.
    pub fn resolve(&self, id: EventId) -> EventId {
        let mut current = id;
        while let Some(next) = self.redirects.get(&current) {
            current = *next;
        }
        current
    }

    pub fn in_view(&self, id: EventId) -> bool {
        self.keys.contains_key(&id)
    }

    pub fn iteration_limit_reached(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}
