//! Error types for aeon-core.

use thiserror::Error;

/// Result type alias using aeon-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during orchestration.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad inputs to a core function
    #[error("Validation error: {0}")]
    Validation(String),

    /// Plan parse or structure failure
    #[error("Plan error: {0}")]
    Plan(String),

    /// LLM provider failure
    #[error("LLM error: {0}")]
    Llm(String),

    /// Supervisor repair exhausted its attempts
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    /// Phase transition contract violation
    #[error("Phase transition error [{error_code}] in {transition_name}: {failure_condition}")]
    PhaseTransition {
        transition_name: String,
        failure_condition: String,
        retryable: bool,
        error_code: String,
    },

    /// Reasoning budget exhausted mid-pass
    #[error("TTL expired (remaining: {ttl_remaining})")]
    TtlExpired { ttl_remaining: i64 },

    /// Memory read/write failure
    #[error("Memory error: {0}")]
    Memory(String),

    /// Tool registry or invocation failure
    #[error("Tool error: {0}")]
    Tool(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a plan error.
    pub fn plan(message: impl Into<String>) -> Self {
        Self::Plan(message.into())
    }

    /// Create an LLM provider error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a supervisor error.
    pub fn supervisor(message: impl Into<String>) -> Self {
        Self::Supervisor(message.into())
    }

    /// Create a phase transition error.
    pub fn phase_transition(
        transition_name: impl Into<String>,
        failure_condition: impl Into<String>,
        retryable: bool,
        error_code: impl Into<String>,
    ) -> Self {
        Self::PhaseTransition {
            transition_name: transition_name.into(),
            failure_condition: failure_condition.into(),
            retryable,
            error_code: error_code.into(),
        }
    }

    /// Whether retrying the failed operation once may succeed.
    ///
    /// Only phase transition errors explicitly marked retryable qualify;
    /// everything else surfaces to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PhaseTransition { retryable: true, .. })
    }

    /// The error code attached to this error, if any.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::PhaseTransition { error_code, .. } => Some(error_code),
            _ => None,
        }
    }

    /// Short machine-readable tag for telemetry records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Plan(_) => "plan",
            Self::Llm(_) => "llm",
            Self::Supervisor(_) => "supervisor",
            Self::PhaseTransition { .. } => "phase_transition",
            Self::TtlExpired { .. } => "ttl_expired",
            Self::Memory(_) => "memory",
            Self::Tool(_) => "tool",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}
