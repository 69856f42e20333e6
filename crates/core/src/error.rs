//! Error types for the Causeway domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Causeway operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Event stream errors ---
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    // --- Persistence errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Runtime errors ---
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    // --- Agent errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Condenser errors ---
    #[error("Condenser error: {0}")]
    Condenser(#[from] CondenserError),

    // --- Safety gate errors ---
    #[error("Safety error: {0}")]
    Safety(#[from] SafetyError),

    // --- Session-level conditions ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum StreamError {
    /// Append attempted after the session terminated.
    #[error("Event stream is closed")]
    Closed,

    #[error("Durable append failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Event log is not contiguous: expected id {expected}, found {found}")]
    Gap { expected: u64, found: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("I/O failure: {0}")]
    Io(String),

    #[error("Failed to (de)serialize event: {0}")]
    Serialization(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Failures reported by a Runtime.
///
/// `Failure` carries a category whose severity is decided by the
/// controller's configured failure policy, not by the runtime.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("{0}")]
    Recoverable(String),

    #[error("{0}")]
    Fatal(String),

    #[error("[{category}] {reason}")]
    Failure { category: String, reason: String },
}

impl RuntimeError {
    pub fn reason(&self) -> &str {
        match self {
            Self::Recoverable(reason) | Self::Fatal(reason) => reason,
            Self::Failure { reason, .. } => reason,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Agent failed to decide: {0}")]
    DecisionFailed(String),

    #[error("Agent produced an invalid action: {0}")]
    InvalidAction(String),
}

#[derive(Debug, Clone, Error)]
pub enum SummarizerError {
    #[error("Summary request failed: {0}")]
    RequestFailed(String),

    #[error("Summarizer returned an empty summary")]
    Empty,
}

#[derive(Debug, Clone, Error)]
pub enum CondenserError {
    /// No further reduction is possible with the configured strategy.
    #[error("Condenser exhausted: {reason}")]
    Exhausted { reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum SafetyError {
    #[error("Security analyzer unavailable: {0}")]
    AnalyzerUnavailable(String),
}

/// The session-level error taxonomy.
///
/// Only runtime-fatal, iteration-limit and condenser-exhaustion end a
/// session; everything else is folded back into the next agent decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Event stream closed")]
    StreamClosed,

    #[error("Iteration limit exceeded ({limit} iterations)")]
    IterationLimitExceeded { limit: u32 },

    #[error("Condenser exhausted: {0}")]
    CondenserExhausted(String),

    #[error("Recoverable runtime failure: {0}")]
    RuntimeRecoverable(String),

    /// Displays the bare reason so it can be surfaced verbatim.
    #[error("{0}")]
    RuntimeFatal(String),

    #[error("Action rejected by safety gate: {0}")]
    SafetyRejected(String),

    #[error("Security analyzer unavailable: {0}")]
    AnalyzerUnavailable(String),
}

impl SessionError {
    /// Whether this condition moves the controller to `ERROR`.
    pub fn is_session_ending(&self) -> bool {
        matches!(
            self,
            Self::StreamClosed
                | Self::IterationLimitExceeded { .. }
                | Self::CondenserExhausted(_)
                | Self::RuntimeFatal(_)
        )
    }
}
