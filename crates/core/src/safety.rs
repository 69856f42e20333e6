//! Safety gate vocabulary — verdicts, risk levels and the inspector trait.
//!
//! Both the security analyzer and the confirmation policy implement
//! [`ActionInspector`]; so does the composed gate, which lets the
//! controller depend on the trait alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SafetyError;
use crate::event::Action;
use crate::state::State;

/// Outcome of inspecting an action. Ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    RequireConfirmation,
    Reject,
}

impl Verdict {
    /// The more restrictive of two verdicts.
    pub fn combine(self, other: Verdict) -> Verdict {
        self.max(other)
    }
}

/// Severity of an action.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown risk level '{other}'")),
        }
    }
}

/// A verdict with the reasoning behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub verdict: Verdict,
    pub risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Assessment {
    pub fn allow(risk: RiskLevel) -> Self {
        Self {
            verdict: Verdict::Allow,
            risk,
            reason: None,
        }
    }

    pub fn new(verdict: Verdict, risk: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            verdict,
            risk,
            reason: Some(reason.into()),
        }
    }

    /// Fold another assessment in; the more restrictive verdict wins and
    /// its reason is kept. Ties keep the first reason.
    pub fn merge(self, other: Assessment) -> Assessment {
        let risk = self.risk.max(other.risk);
        if other.verdict > self.verdict {
            Assessment { risk, ..other }
        } else {
            Assessment { risk, ..self }
        }
    }
}

/// Inspects a proposed action against the current state.
#[async_trait]
pub trait ActionInspector: Send + Sync {
    fn name(&self) -> &str;

    async fn inspect(&self, action: &Action, state: &State) -> Result<Assessment, SafetyError>;
}
