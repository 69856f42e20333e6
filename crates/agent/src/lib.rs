//! The session loop for Causeway.
//!
//! A [`Controller`] drives one session through its state machine:
//!
//! 1. **Condense** the active view when it outgrows the budget
//! 2. **Decide**: the agent proposes exactly one action (or finishes)
//! 3. **Gate**: the safety gate allows, defers for confirmation, or rejects
//! 4. **Dispatch** to the runtime and record the observation
//!
//! The loop continues until the agent finishes, a stop is requested, or a
//! session-ending error (fatal runtime failure, iteration limit, exhausted
//! condenser) moves it to `ERROR`.

pub mod condenser;
pub mod controller;
pub mod knowledge;
pub mod scripted;
pub mod session;

pub use condenser::{
    AmortizedCondenser, AttentionCondenser, Condensation, Condenser, KindScorer, LlmCondenser,
    NoopCondenser, RecentCondenser,
};
pub use controller::{Controller, FailurePolicy, StopHandle};
pub use knowledge::{Microagent, Trigger, TriggerError, TriggerKnowledge};
pub use scripted::{DryRunRuntime, Script, ScriptError, ScriptedAgent};
pub use session::{SessionBuilder, SessionHandle, SessionRegistry, StartError};
