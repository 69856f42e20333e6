//! Pattern-based security analyzer.
//!
//! Rates each proposed action by matching shell commands against a rule
//! set, file paths against forbidden locations, and URLs against private
//! address ranges. Critical findings are rejected outright; high-risk
//! ones require confirmation.

use async_trait::async_trait;
use causeway_config::{RuleConfig, SecurityConfig};
use causeway_core::error::SafetyError;
use causeway_core::event::Action;
use causeway_core::safety::{ActionInspector, Assessment, RiskLevel, Verdict};
use causeway_core::state::State;
use regex_lite::Regex;
use tracing::{debug, warn};

use crate::network::is_private_url;
use crate::path::{PathViolation, check_path};

/// Built-in rules: (name, pattern, risk).
const DEFAULT_RULES: &[(&str, &str, RiskLevel)] = &[
    (
        "recursive-delete-root",
        r"\brm\s+(-[a-zA-Z]+\s+)*-[a-zA-Z]*[rR][a-zA-Z]*\s+(-[a-zA-Z]+\s+)*(/|/\*|~|~/|\$HOME)(\s|$)",
        RiskLevel::Critical,
    ),
    ("filesystem-format", r"\bmkfs(\.[a-z0-9]+)?\b", RiskLevel::Critical),
    ("raw-disk-write", r"\bdd\b.*\bof=/dev/", RiskLevel::Critical),
    ("fork-bomb", r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", RiskLevel::Critical),
    ("world-writable-root", r"\bchmod\s+(-R\s+)?777\s+/(\s|$)", RiskLevel::Critical),
    ("recursive-delete", r"\brm\s+(-[a-zA-Z]+\s+)*-[a-zA-Z]*[rR]", RiskLevel::High),
    (
        "pipe-to-shell",
        r"\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(ba|z|da)?sh\b",
        RiskLevel::High,
    ),
    ("power-state", r"\b(shutdown|reboot|halt|poweroff)\b", RiskLevel::High),
    ("force-push", r"\bgit\s+push\b.*(--force\b|\s-f\b)", RiskLevel::High),
    ("privilege-escalation", r"(^|[;&|]\s*)sudo\b", RiskLevel::Medium),
];

/// Compile a built-in rule table. A rule that fails to compile leaves the
/// gate weaker, so each one is reported.
fn compile_builtin(table: &[(&str, &str, RiskLevel)]) -> Vec<Rule> {
    table
        .iter()
        .filter_map(|(name, pattern, risk)| match Rule::new(name, pattern, *risk) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(rule = %name, error = %e, "Built-in security rule dropped");
                None
            }
        })
        .collect()
}

/// A rule that failed to compile.
#[derive(Debug, thiserror::Error)]
#[error("Invalid security rule '{name}': {reason}")]
pub struct RuleError {
    pub name: String,
    pub reason: String,
}

/// A compiled command rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub pattern: Regex,
    pub risk: RiskLevel,
}

impl Rule {
    pub fn new(name: &str, pattern: &str, risk: RiskLevel) -> Result<Self, RuleError> {
        let pattern = Regex::new(pattern).map_err(|e| RuleError {
            name: name.into(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: name.into(),
            pattern,
            risk,
        })
    }
}

/// Map a risk rating to the verdict the analyzer reports.
pub fn verdict_for(risk: RiskLevel) -> Verdict {
    match risk {
        RiskLevel::Critical => Verdict::Reject,
        RiskLevel::High => Verdict::RequireConfirmation,
        RiskLevel::Medium | RiskLevel::Low => Verdict::Allow,
    }
}

#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    rules: Vec<Rule>,
    forbidden_paths: Vec<String>,
}

impl PatternAnalyzer {
    pub fn new(rules: Vec<Rule>, forbidden_paths: Vec<String>) -> Self {
        Self {
            rules,
            forbidden_paths,
        }
    }

    /// The built-in rule set.
    pub fn with_defaults(forbidden_paths: Vec<String>) -> Self {
        Self::new(compile_builtin(DEFAULT_RULES), forbidden_paths)
    }

    /// Built-in rules plus the configured extras.
    pub fn from_config(config: &SecurityConfig) -> Result<Self, RuleError> {
        let mut analyzer = Self::with_defaults(config.forbidden_paths.clone());
        for RuleConfig {
            name,
            pattern,
            risk,
        } in &config.rules
        {
            analyzer.rules.push(Rule::new(name, pattern, *risk)?);
        }
        Ok(analyzer)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rate an action without consulting session state.
    pub fn assess(&self, action: &Action) -> Assessment {
        let (risk, reason) = match action {
            Action::Run { command } => self.assess_command(command),
            Action::Write { path, .. } => match check_path(path, &self.forbidden_paths) {
                Ok(()) => (RiskLevel::Low, None),
                Err(v @ PathViolation::Forbidden { .. }) => (RiskLevel::Critical, Some(v.to_string())),
                Err(v @ PathViolation::Traversal { .. }) => (RiskLevel::High, Some(v.to_string())),
            },
            Action::Read { path } => match check_path(path, &self.forbidden_paths) {
                Ok(()) => (RiskLevel::Low, None),
                Err(v) => (RiskLevel::High, Some(v.to_string())),
            },
            Action::Browse { url } if is_private_url(url) => (
                RiskLevel::High,
                Some(format!("'{url}' targets a private or internal address")),
            ),
            Action::Browse { .. } | Action::AskUser { .. } => (RiskLevel::Low, None),
        };

        match reason {
            Some(reason) => {
                debug!(action = action.name(), %risk, %reason, "Analyzer flagged action");
                Assessment::new(verdict_for(risk), risk, reason)
            }
            None => Assessment::allow(risk),
        }
    }

    /// Highest-risk matching rule for a shell command.
    fn assess_command(&self, command: &str) -> (RiskLevel, Option<String>) {
        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(command))
            .max_by_key(|rule| rule.risk)
            .map_or((RiskLevel::Low, None), |rule| {
                (
                    rule.risk,
                    Some(format!("command matches rule '{}'", rule.name)),
                )
            })
    }
}

#[async_trait]
impl ActionInspector for PatternAnalyzer {
    fn name(&self) -> &str {
        "pattern_analyzer"
    }

    async fn inspect(&self, action: &Action, _state: &State) -> Result<Assessment, SafetyError> {
        Ok(self.assess(action))
    }
}
