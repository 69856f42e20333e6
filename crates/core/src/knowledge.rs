//! Knowledge retrieval — microagent snippets matched against the view.
//!
//! The controller does not interpret trigger semantics; it only asks for a
//! ranked list of snippets when building the prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::view::View;

/// A piece of knowledge offered to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    /// The microagent that produced it.
    pub source: String,
    pub content: String,
    /// Ranking score (set by the matcher).
    #[serde(default)]
    pub score: f32,
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    fn name(&self) -> &str;

    /// Snippets relevant to `view`, best first.
    async fn match_view(&self, view: &View) -> Vec<Snippet>;
}

/// A knowledge base that never matches.
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeBase for NoKnowledge {
    fn name(&self) -> &str {
        "none"
    }

    async fn match_view(&self, _view: &View) -> Vec<Snippet> {
        Vec::new()
    }
}
