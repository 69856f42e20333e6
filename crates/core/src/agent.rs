//! Agent traits — the decision-making collaborators of the controller.
//!
//! An [`Agent`] maps the active view to exactly one proposed action. A
//! [`Summarizer`] is the secondary model call used by model-backed
//! condensers. Both are external capabilities selected at session
//! construction time; the controller only knows these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, SummarizerError};
use crate::event::{Action, Event};
use crate::knowledge::Snippet;
use crate::state::State;
use crate::view::View;

/// What the agent is shown for one step.
#[derive(Debug, Clone)]
pub struct PromptView {
    pub view: View,
    /// Knowledge snippets matched against the view, best first.
    pub knowledge: Vec<Snippet>,
}

/// An agent's answer for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    Act { action: Action },
    /// The agent believes the task is complete.
    NoFurtherAction {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Maps a state snapshot to one proposed action.
///
/// Implementations must be pure functions of their input so sessions
/// stay replayable.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, prompt: &PromptView, state: &State) -> Result<Decision, AgentError>;
}

/// Produces a textual summary of a span of events.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(&self, events: &[Event]) -> Result<String, SummarizerError>;
}

/// Scores how important each event is to keep in the view.
///
/// Higher scores are kept; the attention condenser drops the lowest.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, events: &[Event]) -> Result<Vec<f32>, SummarizerError>;
}
