//! # Causeway Core
//!
//! Domain types, traits, and error definitions for the Causeway agent
//! orchestration core. This crate defines the event model, the event
//! stream every component communicates through, and the session state
//! the controller folds those events into.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (agent, runtime, persistence, knowledge
//! retrieval, safety inspection) is a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod event;
pub mod knowledge;
pub mod runtime;
pub mod safety;
pub mod state;
pub mod storage;
pub mod stream;
pub mod token;
pub mod view;

// Re-export key types at crate root for ergonomics
pub use agent::{Agent, Decision, PromptView, RelevanceScorer, Summarizer};
pub use error::{Error, Result, SessionError};
pub use event::{
    Action, ActionEvent, Event, EventDraft, EventId, EventKind, EventPayload, EventSource,
    GateStatus, Notice, Observation, RejectionOrigin, Summary,
};
pub use knowledge::{KnowledgeBase, NoKnowledge, Snippet};
pub use runtime::Runtime;
pub use safety::{ActionInspector, Assessment, RiskLevel, Verdict};
pub use state::{Budget, ControllerStatus, Limits, SessionId, State};
pub use storage::EventStore;
pub use stream::{EventStream, Replay, Subscription};
pub use view::View;
