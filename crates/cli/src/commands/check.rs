//! `causeway check` — Evaluate the safety gate for a shell command.

use std::sync::Arc;

use causeway_config::AppConfig;
use causeway_core::event::Action;
use causeway_core::safety::{ActionInspector, Assessment, Verdict};
use causeway_core::state::{SessionId, State};
use causeway_security::{AuditLogger, SafetyGate};

pub async fn run(config: AppConfig, command: &str) -> Result<(), Box<dyn std::error::Error>> {
    let assessment = assess(&config, command).await?;
    println!("  Command: {command}");
    println!("  Verdict: {}", verdict_label(assessment.verdict));
    println!("  Risk:    {}", assessment.risk);
    if let Some(reason) = &assessment.reason {
        println!("  Reason:  {reason}");
    }
    Ok(())
}

async fn assess(config: &AppConfig, command: &str) -> Result<Assessment, Box<dyn std::error::Error>> {
    let gate = SafetyGate::from_config(&config.security, Arc::new(AuditLogger::new()))?;
    let state = State::new(SessionId::from("check"), config.controller.limits());
    let action = Action::Run {
        command: command.to_string(),
    };
    Ok(gate.inspect(&action, &state).await?)
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Allow => "allow",
        Verdict::RequireConfirmation => "require confirmation",
        Verdict::Reject => "reject",
    }
}
