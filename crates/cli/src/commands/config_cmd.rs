//! `causeway config` — Configuration management commands.

use std::path::Path;

use causeway_config::{AppConfig, CondenserConfig};
use causeway_core::state::Budget;

/// Settings that load fine but will probably not behave as intended.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if matches!(config.condenser, CondenserConfig::Noop)
        && !matches!(config.controller.budget, Budget::Unbounded)
    {
        warnings.push(
            "noop condenser with a bounded budget: the session errors once the budget is reached"
                .to_string(),
        );
    }

    let security = &config.security;
    if !security.analyzer_enabled && !security.confirmation_mode {
        warnings.push("security analyzer and confirmation mode are both off".into());
    }
    if let Some(admin) = security.admin_override.as_ref().filter(|o| o.enabled) {
        warnings.push(format!(
            "administrative override is ON ({}); every action is allowed",
            admin.reason
        ));
    }
    if config.storage.backend == "none" || config.storage.backend == "memory" {
        warnings.push(format!(
            "storage backend '{}' keeps nothing after exit; replay will find no sessions",
            config.storage.backend
        ));
    }

    warnings
}

pub async fn validate(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match AppConfig::load_with_env(&super::config_file(path)) {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Iterations:   {}", config.controller.max_iterations);
    println!("   Budget:       {:?}", config.controller.budget);
    println!("   Condenser:    {:?}", config.condenser);
    println!(
        "   Confirmation: {}",
        if config.security.confirmation_mode {
            format!("on (threshold {})", config.security.confirmation_threshold)
        } else {
            "off".into()
        }
    );
    println!("   Storage:      {} ({})", config.storage.backend, config.storage.resolved_path().display());
    println!("   Knowledge:    {} microagents", config.knowledge.len());

    Ok(())
}

pub async fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", super::config_file(path).display());
    Ok(())
}
