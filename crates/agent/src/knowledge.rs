//! Trigger-matched knowledge microagents.
//!
//! Each microagent carries a snippet and a set of triggers. A trigger is a
//! keyword (case-insensitive, matched on word boundaries) or, with a
//! `regex:` prefix, a regular expression. Triggers are checked against the
//! user messages in the active view; microagents are ranked by how many of
//! their triggers hit, then by name.

use async_trait::async_trait;
use causeway_config::MicroagentConfig;
use causeway_core::knowledge::{KnowledgeBase, Snippet};
use causeway_core::view::View;
use regex_lite::Regex;
use tracing::debug;

/// A trigger that failed to compile.
#[derive(Debug, thiserror::Error)]
#[error("Invalid trigger '{trigger}' for microagent '{microagent}': {reason}")]
pub struct TriggerError {
    pub microagent: String,
    pub trigger: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum Trigger {
    Keyword(String),
    Pattern(Regex),
}

impl Trigger {
    pub fn parse(raw: &str) -> Result<Self, regex_lite::Error> {
        match raw.strip_prefix("regex:") {
            Some(pattern) => Ok(Self::Pattern(Regex::new(pattern)?)),
            None => Ok(Self::Keyword(raw.trim().to_lowercase())),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Keyword(keyword) => contains_word(&text.to_lowercase(), keyword),
            Self::Pattern(pattern) => pattern.is_match(text),
        }
    }
}

/// Whether `word` occurs in `text` with no alphanumeric character on either side.
fn contains_word(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(word).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

#[derive(Debug, Clone)]
pub struct Microagent {
    pub name: String,
    pub triggers: Vec<Trigger>,
    pub content: String,
}

impl Microagent {
    /// Number of triggers that fire on any of `messages`.
    fn hits(&self, messages: &[&str]) -> usize {
        self.triggers
            .iter()
            .filter(|t| messages.iter().any(|m| t.matches(m)))
            .count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriggerKnowledge {
    agents: Vec<Microagent>,
}

impl TriggerKnowledge {
    pub fn new(agents: Vec<Microagent>) -> Self {
        Self { agents }
    }

    /// Build from `[[knowledge]]` entries, skipping disabled ones.
    pub fn from_config(entries: &[MicroagentConfig]) -> Result<Self, TriggerError> {
        let mut agents = Vec::new();
        for entry in entries.iter().filter(|e| e.enabled) {
            let triggers = entry
                .triggers
                .iter()
                .map(|raw| {
                    Trigger::parse(raw).map_err(|e| TriggerError {
                        microagent: entry.name.clone(),
                        trigger: raw.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            agents.push(Microagent {
                name: entry.name.clone(),
                triggers,
                content: entry.content.clone(),
            });
        }
        Ok(Self::new(agents))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Ranked snippets for a set of user messages.
    pub fn match_messages(&self, messages: &[&str]) -> Vec<Snippet> {
        let mut matched: Vec<(usize, &Microagent)> = self
            .agents
            .iter()
            .map(|agent| (agent.hits(messages), agent))
            .filter(|(hits, _)| *hits > 0)
            .collect();
        matched.sort_by(|(ha, a), (hb, b)| hb.cmp(ha).then_with(|| a.name.cmp(&b.name)));

        matched
            .into_iter()
            .map(|(hits, agent)| Snippet {
                source: agent.name.clone(),
                content: agent.content.clone(),
                score: hits as f32,
            })
            .collect()
    }
}

#[async_trait]
impl KnowledgeBase for TriggerKnowledge {
    fn name(&self) -> &str {
        "triggers"
    }

    async fn match_view(&self, view: &View) -> Vec<Snippet> {
        let messages: Vec<&str> = view.user_messages().collect();
        let snippets = self.match_messages(&messages);
        if !snippets.is_empty() {
            debug!(count = snippets.len(), "Knowledge snippets matched");
        }
        snippets
    }
}
