//! Confirmation policy — asks a human before risky actions run.
//!
//! Independent of the analyzer's verdict: when enabled, any action whose
//! severity is at or above the threshold requires confirmation. Severity is
//! the larger of a per-kind baseline and the analyzer's rating.

use std::sync::Arc;

use async_trait::async_trait;
use causeway_config::SecurityConfig;
use causeway_core::error::SafetyError;
use causeway_core::event::Action;
use causeway_core::safety::{ActionInspector, Assessment, RiskLevel, Verdict};
use causeway_core::state::State;

use crate::analyzer::PatternAnalyzer;

#[derive(Debug, Clone)]
pub struct ConfirmationPolicy {
    enabled: bool,
    threshold: RiskLevel,
    severity: Option<Arc<PatternAnalyzer>>,
}

impl ConfirmationPolicy {
    pub fn new(enabled: bool, threshold: RiskLevel) -> Self {
        Self {
            enabled,
            threshold,
            severity: None,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.confirmation_mode, config.confirmation_threshold)
    }

    /// Use `analyzer` ratings when judging severity.
    pub fn with_severity(mut self, analyzer: Arc<PatternAnalyzer>) -> Self {
        self.severity = Some(analyzer);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Severity of `action` as this policy sees it.
    pub fn severity(&self, action: &Action) -> RiskLevel {
        let baseline = match action {
            Action::AskUser { .. } | Action::Read { .. } | Action::Browse { .. } => RiskLevel::Low,
            Action::Run { .. } | Action::Write { .. } => RiskLevel::Medium,
        };
        let rated = self
            .severity
            .as_ref()
            .map_or(RiskLevel::Low, |analyzer| analyzer.assess(action).risk);
        baseline.max(rated)
    }
}

#[async_trait]
impl ActionInspector for ConfirmationPolicy {
    fn name(&self) -> &str {
        "confirmation_policy"
    }

    async fn inspect(&self, action: &Action, _state: &State) -> Result<Assessment, SafetyError> {
        let risk = self.severity(action);
        // Asking the user is already a confirmation round-trip.
        if !self.enabled || action.awaits_user() || risk < self.threshold {
            return Ok(Assessment::allow(risk));
        }
        Ok(Assessment::new(
            Verdict::RequireConfirmation,
            risk,
            format!("confirmation mode: {} is {risk} risk", action.name()),
        ))
    }
}
