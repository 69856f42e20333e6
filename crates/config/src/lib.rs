//! Configuration loading, validation, and management for Causeway.
//!
//! Loads configuration from `~/.causeway/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use causeway_core::safety::RiskLevel;
use causeway_core::state::{Budget, Limits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.causeway/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Controller loop settings
    #[serde(default)]
    pub controller: ControllerConfig,

    /// History condensation strategy
    #[serde(default)]
    pub condenser: CondenserConfig,

    /// Safety gate settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Event log persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Event stream tuning
    #[serde(default)]
    pub stream: StreamConfig,

    /// Knowledge microagents
    #[serde(default)]
    pub knowledge: Vec<MicroagentConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default)]
    pub budget: Budget,

    /// Per-dispatch runtime timeout; expiry is reported as a recoverable failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_timeout_secs: Option<u64>,

    /// `RuntimeError::Failure` categories that end the session.
    #[serde(default = "default_fatal_categories")]
    pub fatal_failure_categories: Vec<String>,
}

fn default_max_iterations() -> u32 {
    100
}
fn default_fatal_categories() -> Vec<String> {
    vec!["sandbox_lost".into(), "disk_full".into()]
}

impl ControllerConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            max_iterations: self.max_iterations,
            budget: self.budget,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            budget: Budget::default(),
            runtime_timeout_secs: None,
            fatal_failure_categories: default_fatal_categories(),
        }
    }
}

/// Which condensation strategy to run, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CondenserConfig {
    Noop,
    Recent {
        #[serde(default = "default_keep_first")]
        keep_first: usize,
        #[serde(default = "default_max_size")]
        max_size: usize,
    },
    Llm {
        #[serde(default = "default_keep_first")]
        keep_first: usize,
        #[serde(default = "default_max_size")]
        max_size: usize,
    },
    Amortized {
        /// Condense only every `every` iterations.
        every: u32,
        /// How far past the budget the view may grow between condensations.
        #[serde(default)]
        slack: usize,
        inner: Box<CondenserConfig>,
    },
    Attention {
        #[serde(default = "default_keep_first")]
        keep_first: usize,
        #[serde(default = "default_max_size")]
        max_size: usize,
    },
}

fn default_keep_first() -> usize {
    1
}
fn default_max_size() -> usize {
    100
}

impl Default for CondenserConfig {
    fn default() -> Self {
        Self::Recent {
            keep_first: default_keep_first(),
            max_size: default_max_size(),
        }
    }
}

impl CondenserConfig {
    /// Largest view the strategy condenses down to, if it has one.
    pub fn max_size(&self) -> Option<usize> {
        match self {
            Self::Noop => None,
            Self::Recent { max_size, .. }
            | Self::Llm { max_size, .. }
            | Self::Attention { max_size, .. } => Some(*max_size),
            Self::Amortized { inner, .. } => inner.max_size(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Noop => Ok(()),
            Self::Recent { keep_first, max_size }
            | Self::Llm { keep_first, max_size }
            | Self::Attention { keep_first, max_size } => {
                // Room for the kept head, one summary and at least one recent event.
                if *max_size < keep_first + 2 {
                    return Err(ConfigError::ValidationError(format!(
                        "condenser max_size ({max_size}) must be at least keep_first + 2 ({})",
                        keep_first + 2
                    )));
                }
                Ok(())
            }
            Self::Amortized { every, inner, .. } => {
                if *every == 0 {
                    return Err(ConfigError::ValidationError(
                        "amortized condenser `every` must be > 0".into(),
                    ));
                }
                if matches!(**inner, Self::Amortized { .. }) {
                    return Err(ConfigError::ValidationError(
                        "amortized condensers cannot be nested".into(),
                    ));
                }
                inner.validate()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Run the pattern security analyzer
    #[serde(default = "default_true")]
    pub analyzer_enabled: bool,

    /// Require confirmation for actions at or above `confirmation_threshold`
    #[serde(default)]
    pub confirmation_mode: bool,

    #[serde(default)]
    pub confirmation_threshold: RiskLevel,

    /// Paths that may never be written
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    /// Extra analyzer rules, added to the built-in set
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Administrative override: disables every check. Always audited.
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub admin_override: Option<OverrideConfig>,
}

fn default_forbidden_paths() -> Vec<String> {
    vec![
        "/etc".into(),
        "/boot".into(),
        "/proc".into(),
        "/sys".into(),
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
    ]
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            analyzer_enabled: true,
            confirmation_mode: false,
            confirmation_threshold: RiskLevel::Low,
            forbidden_paths: default_forbidden_paths(),
            rules: vec![],
            admin_override: None,
        }
    }
}

/// A pattern rule for the security analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    /// Regular expression matched against the shell command
    pub pattern: String,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Why the override is in place (recorded with every overridden verdict)
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory", "file", "sqlite" or "none"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Directory (file backend) or database file (sqlite backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_storage_backend() -> String {
    "file".into()
}

impl StorageConfig {
    /// The configured path, or the backend's default under `~/.causeway`.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => expand_home(path),
            None if self.backend == "sqlite" => AppConfig::config_dir().join("sessions.db"),
            None => AppConfig::config_dir().join("sessions"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Broadcast capacity for subscriber wake-ups
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_subscriber_capacity() -> usize {
    256
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

/// A knowledge microagent: snippet content plus the triggers that surface it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroagentConfig {
    pub name: String,

    /// Keywords, or `regex:<pattern>`
    pub triggers: Vec<String>,

    pub content: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AppConfig {
    /// Load configuration from the default path (~/.causeway/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment variable overrides:
    /// - `CAUSEWAY_MAX_ITERATIONS`
    /// - `CAUSEWAY_CONFIRMATION_MODE`
    /// - `CAUSEWAY_STORAGE_PATH`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = var("CAUSEWAY_MAX_ITERATIONS") {
            self.controller.max_iterations = value.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CAUSEWAY_MAX_ITERATIONS must be a positive integer, got '{value}'"
                ))
            })?;
        }
        if let Some(value) = var("CAUSEWAY_CONFIRMATION_MODE") {
            self.security.confirmation_mode = matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(value) = var("CAUSEWAY_STORAGE_PATH") {
            self.storage.path = Some(value);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".causeway")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "controller.max_iterations must be > 0".into(),
            ));
        }

        if self.controller.budget.limit() == Some(0) {
            return Err(ConfigError::ValidationError(
                "controller.budget.limit must be > 0".into(),
            ));
        }

        self.condenser.validate()?;

        // A window larger than the budget leaves the view over budget after
        // every condensation.
        if let (Budget::Events(limit), Some(max_size)) =
            (self.controller.budget, self.condenser.max_size())
        {
            if max_size > limit {
                return Err(ConfigError::ValidationError(format!(
                    "condenser max_size ({max_size}) exceeds the event budget ({limit})"
                )));
            }
        }

        if !matches!(
            self.storage.backend.as_str(),
            "memory" | "file" | "sqlite" | "none"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage backend '{}'",
                self.storage.backend
            )));
        }

        for rule in &self.security.rules {
            if rule.pattern.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "security rule '{}' has an empty pattern",
                    rule.name
                )));
            }
        }

        if let Some(admin) = &self.security.admin_override {
            if admin.enabled && admin.reason.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "security.override requires a reason when enabled".into(),
                ));
            }
        }

        for agent in &self.knowledge {
            if agent.triggers.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "microagent '{}' has no triggers",
                    agent.name
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs_home().join(rest),
        None => PathBuf::from(path),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
