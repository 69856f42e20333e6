//! The safety gate — analyzer and confirmation policy composed in sequence.
//!
//! The more restrictive verdict wins. An inspector that fails to evaluate
//! yields `RequireConfirmation`, never `Allow`. The administrative override
//! reduces every verdict to `Allow` and is audited each time it applies.

use std::sync::Arc;

use async_trait::async_trait;
use causeway_config::SecurityConfig;
use causeway_core::error::SafetyError;
use causeway_core::event::Action;
use causeway_core::safety::{ActionInspector, Assessment, RiskLevel, Verdict};
use causeway_core::state::State;
use tracing::{debug, warn};

use crate::analyzer::{PatternAnalyzer, RuleError};
use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};
use crate::confirmation::ConfirmationPolicy;

pub struct SafetyGate {
    inspectors: Vec<Arc<dyn ActionInspector>>,
    override_reason: Option<String>,
    audit: Arc<AuditLogger>,
}

impl std::fmt::Debug for SafetyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyGate")
            .field(
                "inspectors",
                &self.inspectors.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field("override", &self.override_reason)
            .finish()
    }
}

impl SafetyGate {
    /// A gate with no inspectors; add them with [`SafetyGate::with_inspector`].
    pub fn new(audit: Arc<AuditLogger>) -> Self {
        Self {
            inspectors: Vec::new(),
            override_reason: None,
            audit,
        }
    }

    /// Append an inspector. Inspectors run in the order they were added.
    pub fn with_inspector(mut self, inspector: Arc<dyn ActionInspector>) -> Self {
        self.inspectors.push(inspector);
        self
    }

    /// Enable the administrative override.
    pub fn with_override(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(%reason, "Safety gate override enabled; all actions will be allowed");
        self.override_reason = Some(reason);
        self
    }

    /// Build the gate described by `[security]`.
    pub fn from_config(config: &SecurityConfig, audit: Arc<AuditLogger>) -> Result<Self, RuleError> {
        let analyzer = Arc::new(PatternAnalyzer::from_config(config)?);
        let policy = ConfirmationPolicy::from_config(config).with_severity(analyzer.clone());

        let mut gate = Self::new(audit);
        if config.analyzer_enabled {
            gate = gate.with_inspector(analyzer);
        }
        gate = gate.with_inspector(Arc::new(policy));

        if let Some(admin) = config.admin_override.as_ref().filter(|o| o.enabled) {
            gate = gate.with_override(admin.reason.clone());
        }
        Ok(gate)
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn is_overridden(&self) -> bool {
        self.override_reason.is_some()
    }
}

#[async_trait]
impl ActionInspector for SafetyGate {
    fn name(&self) -> &str {
        "safety_gate"
    }

    async fn inspect(&self, action: &Action, state: &State) -> Result<Assessment, SafetyError> {
        let actor = state.session_id.to_string();
        let target = action.describe();

        if let Some(reason) = &self.override_reason {
            warn!(session_id = %actor, action = %target, "Safety checks bypassed by override");
            self.audit.log(
                AuditEvent::OverrideApplied {
                    reason: reason.clone(),
                },
                &actor,
                &target,
                AuditOutcome::Allowed,
                None,
            );
            return Ok(Assessment {
                verdict: Verdict::Allow,
                risk: RiskLevel::Low,
                reason: Some(format!("override: {reason}")),
            });
        }

        let mut assessment = Assessment::allow(RiskLevel::Low);
        for inspector in &self.inspectors {
            let verdict = match inspector.inspect(action, state).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(inspector = inspector.name(), error = %e, "Inspector unavailable, requiring confirmation");
                    self.audit.log(
                        AuditEvent::AnalyzerUnavailable {
                            inspector: inspector.name().into(),
                        },
                        &actor,
                        &target,
                        AuditOutcome::Deferred,
                        Some(e.to_string()),
                    );
                    Assessment::new(Verdict::RequireConfirmation, RiskLevel::High, e.to_string())
                }
            };
            assessment = assessment.merge(verdict);
            if assessment.verdict == Verdict::Reject {
                break;
            }
        }

        debug!(session_id = %actor, action = %target, verdict = ?assessment.verdict, risk = %assessment.risk, "Safety gate verdict");
        self.audit.log(
            AuditEvent::GateVerdict {
                verdict: assessment.verdict,
            },
            &actor,
            &target,
            assessment.verdict.into(),
            assessment.reason.clone(),
        );
        Ok(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_config::OverrideConfig;
    use causeway_core::state::{Limits, SessionId};

    /// An inspector that always answers with a fixed verdict.
    struct Fixed(Verdict);

    #[async_trait]
    impl ActionInspector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn inspect(&self, _: &Action, _: &State) -> Result<Assessment, SafetyError> {
            Ok(Assessment::new(self.0, RiskLevel::Medium, format!("{:?}", self.0)))
        }
    }

    struct Broken;

    #[async_trait]
    impl ActionInspector for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn inspect(&self, _: &Action, _: &State) -> Result<Assessment, SafetyError> {
            Err(SafetyError::AnalyzerUnavailable("model offline".into()))
        }
    }

    fn state() -> State {
        State::new(SessionId::from("gate"), Limits::default())
    }

    fn ls() -> Action {
        Action::Run { command: "ls".into() }
    }

    fn gate(verdicts: &[Verdict]) -> SafetyGate {
        verdicts.iter().fold(SafetyGate::new(Arc::default()), |g, v| {
            g.with_inspector(Arc::new(Fixed(*v)))
        })
    }

    #[tokio::test]
    async fn more_restrictive_verdict_wins() {
        let a = gate(&[Verdict::RequireConfirmation, Verdict::Allow])
            .inspect(&ls(), &state())
            .await
            .unwrap();
        assert_eq!(a.verdict, Verdict::RequireConfirmation);

        for other in [Verdict::Allow, Verdict::RequireConfirmation, Verdict::Reject] {
            let a = gate(&[Verdict::Reject, other]).inspect(&ls(), &state()).await.unwrap();
            assert_eq!(a.verdict, Verdict::Reject);
            let a = gate(&[other, Verdict::Reject]).inspect(&ls(), &state()).await.unwrap();
            assert_eq!(a.verdict, Verdict::Reject);
        }
    }

    #[tokio::test]
    async fn empty_gate_allows() {
        let a = gate(&[]).inspect(&ls(), &state()).await.unwrap();
        assert_eq!(a.verdict, Verdict::Allow);
    }

    #[tokio::test]
    async fn unavailable_inspector_fails_closed() {
        let gate = SafetyGate::new(Arc::default())
            .with_inspector(Arc::new(Broken))
            .with_inspector(Arc::new(Fixed(Verdict::Allow)));
        let a = gate.inspect(&ls(), &state()).await.unwrap();
        assert_eq!(a.verdict, Verdict::RequireConfirmation);

        let entries = gate.audit().entries();
        assert!(entries.iter().any(|e| matches!(
            &e.event,
            AuditEvent::AnalyzerUnavailable { inspector } if inspector == "broken"
        )));
    }

    #[tokio::test]
    async fn override_allows_and_is_audited() {
        let gate = gate(&[Verdict::Reject]).with_override("incident 42");
        assert!(gate.is_overridden());
        let a = gate.inspect(&ls(), &state()).await.unwrap();
        assert_eq!(a.verdict, Verdict::Allow);

        let entries = gate.audit().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].event,
            AuditEvent::OverrideApplied { reason: "incident 42".into() }
        );
        assert_eq!(entries[0].actor, "gate");
    }

    #[tokio::test]
    async fn every_verdict_is_audited() {
        let gate = gate(&[Verdict::RequireConfirmation]);
        gate.inspect(&ls(), &state()).await.unwrap();
        let entries = gate.audit().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, AuditOutcome::Deferred);
    }

    #[tokio::test]
    async fn from_config_confirmation_mode() {
        let config = SecurityConfig {
            confirmation_mode: true,
            ..SecurityConfig::default()
        };
        let gate = SafetyGate::from_config(&config, Arc::default()).unwrap();
        let a = gate.inspect(&ls(), &state()).await.unwrap();
        assert_eq!(a.verdict, Verdict::RequireConfirmation);

        let a = gate
            .inspect(&Action::Run { command: "rm -rf /".into() }, &state())
            .await
            .unwrap();
        assert_eq!(a.verdict, Verdict::Reject);
    }

    #[tokio::test]
    async fn from_config_default_allows_plain_commands() {
        let gate = SafetyGate::from_config(&SecurityConfig::default(), Arc::default()).unwrap();
        let a = gate.inspect(&ls(), &state()).await.unwrap();
        assert_eq!(a.verdict, Verdict::Allow);
    }

    #[tokio::test]
    async fn disabled_override_is_ignored() {
        let config = SecurityConfig {
            admin_override: Some(OverrideConfig {
                enabled: false,
                reason: "unused".into(),
            }),
            ..SecurityConfig::default()
        };
        let gate = SafetyGate::from_config(&config, Arc::default()).unwrap();
        assert!(!gate.is_overridden());
    }
}
