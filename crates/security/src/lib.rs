//! Safety gate for Causeway — action inspection, confirmation, and audit logging.
//!
//! Provides:
//! - **Analyzer**: Pattern rules over commands, paths and URLs
//! - **Confirmation policy**: Human approval above a severity threshold
//! - **Gate**: Composition of the two, with an audited administrative override
//! - **Audit logging**: Structured records of every safety decision

pub mod analyzer;
pub mod audit;
pub mod confirmation;
pub mod gate;
pub mod network;
pub mod path;

pub use analyzer::{PatternAnalyzer, Rule, RuleError, verdict_for};
pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use confirmation::ConfirmationPolicy;
pub use gate::SafetyGate;
pub use network::is_private_url;
pub use path::{PathViolation, check_path};
