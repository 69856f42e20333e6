//! Scripted collaborators for dry runs and tests.
//!
//! A script is a TOML file:
//!
//! ```toml
//! task = "tidy the build directory"
//! finish = "build directory cleaned"
//!
//! [[steps]]
//! type = "run"
//! command = "ls target"
//!
//! [[steps]]
//! type = "write"
//! path = "notes.txt"
//! content = "done"
//! ```
//!
//! [`ScriptedAgent`] proposes step N at iteration N and finishes when the
//! steps run out. Because the step is a function of the iteration count
//! alone, a replayed session proposes exactly the same actions.

use std::path::Path;

use async_trait::async_trait;
use causeway_core::agent::{Agent, Decision, PromptView};
use causeway_core::error::{AgentError, RuntimeError};
use causeway_core::event::{Action, Observation};
use causeway_core::runtime::Runtime;
use causeway_core::state::State;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse script {path}: {reason}")]
    Parse { path: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// The opening user message.
    pub task: String,
    #[serde(default)]
    pub steps: Vec<Action>,
    /// Message recorded when the script completes.
    #[serde(default)]
    pub finish: Option<String>,
}

impl Script {
    pub fn from_toml(content: &str) -> Result<Self, ScriptError> {
        toml::from_str(content).map_err(|e| ScriptError::Parse {
            path: "<inline>".into(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path).map_err(|e| ScriptError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ScriptError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

pub struct ScriptedAgent {
    script: Script,
}

impl ScriptedAgent {
    pub fn new(script: Script) -> Self {
        Self { script }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, _prompt: &PromptView, state: &State) -> Result<Decision, AgentError> {
        match self.script.steps.get(state.iteration as usize) {
            Some(action) => {
                debug!(step = state.iteration, action = %action.describe(), "Scripted step");
                Ok(Decision::Act {
                    action: action.clone(),
                })
            }
            None => Ok(Decision::NoFurtherAction {
                message: self.script.finish.clone(),
            }),
        }
    }
}

/// Describes what would have happened instead of doing it.
pub struct DryRunRuntime;

#[async_trait]
impl Runtime for DryRunRuntime {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn execute(&self, action: &Action) -> Result<Observation, RuntimeError> {
        Ok(Observation::Output {
            content: format!("[dry-run] would {}", action.describe()),
            exit_code: Some(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_core::state::{Limits, SessionId};
    use causeway_core::view::View;

    const SCRIPT: &str = r#"
task = "tidy up"
finish = "all tidy"

[[steps]]
type = "run"
command = "ls"

[[steps]]
type = "read"
path = "Cargo.toml"
"#;

    fn prompt() -> PromptView {
        PromptView {
            view: View::default(),
            knowledge: vec![],
        }
    }

    #[test]
    fn parses_steps() {
        let script = Script::from_toml(SCRIPT).unwrap();
        assert_eq!(script.task, "tidy up");
        assert_eq!(script.steps.len(), 2);
        assert_eq!(script.steps[1], Action::Read { path: "Cargo.toml".into() });
    }

    #[test]
    fn rejects_unknown_action_types() {
        let err = Script::from_toml("task = \"x\"\n[[steps]]\ntype = \"teleport\"\n").unwrap_err();
        assert!(matches!(err, ScriptError::Parse { .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Script::load(Path::new("/nonexistent/script.toml")).unwrap_err();
        assert!(matches!(err, ScriptError::Read { .. }));
    }

    #[tokio::test]
    async fn proposes_step_per_iteration_then_finishes() {
        let agent = ScriptedAgent::new(Script::from_toml(SCRIPT).unwrap());
        let mut state = State::new(SessionId::from("s"), Limits::default());

        let first = agent.decide(&prompt(), &state).await.unwrap();
        assert_eq!(first, Decision::Act { action: Action::Run { command: "ls".into() } });

        state.iteration = 2;
        let done = agent.decide(&prompt(), &state).await.unwrap();
        assert_eq!(done, Decision::NoFurtherAction { message: Some("all tidy".into()) });
    }

    #[tokio::test]
    async fn dry_run_describes_the_action() {
        let observation = DryRunRuntime
            .execute(&Action::Run { command: "make".into() })
            .await
            .unwrap();
        assert_eq!(
            observation,
            Observation::Output {
                content: "[dry-run] would run `make`".into(),
                exit_code: Some(0)
            }
        );
    }
}
