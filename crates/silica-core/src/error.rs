//! Core error type with stable transport codes.
//!
//! Every error the core can surface to a transport maps to one variant here.
//! `code()` is the wire-stable identifier; the Display impl is the
//! human-readable message. Subprocess and handler failures inside tools are
//! converted to error `ToolResult`s at the executor boundary and never
//! propagate as `CoreError`.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize)]
pub enum CoreError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session conflict: {0}")]
    SessionConflict(String),

    #[error("invalid arguments: {0}")]
    BadArgs(String),

    #[error("tool '{0}' is not visible under the active tool filter")]
    ToolNotVisible(String),

    #[error("external tool missing: {0}")]
    ToolMissing(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("step budget exhausted after {0} iterations")]
    StepBudgetExhausted(usize),

    #[error("path '{0}' escapes the session workspace")]
    WorkspacePathEscape(String),

    #[error("file '{path}' is {size} bytes, exceeding the {cap} byte cap")]
    FileTooLarge { path: String, size: u64, cap: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("edit anchor not found: {0}")]
    ConflictNotFound(String),

    #[error("job conflict: {0}")]
    JobConflict(String),

    #[error("job '{0}' is stuck")]
    JobStuck(String),

    #[error("job failed with exit code {exit_code:?}")]
    JobFailed { exit_code: Option<i32> },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("model provider error: {0}")]
    Provider(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl CoreError {
    /// Stable code for transport serialization. New variants get new codes;
    /// existing codes never change.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::SessionNotFound(_) => "SessionNotFound",
            CoreError::SessionConflict(_) => "SessionConflict",
            CoreError::BadArgs(_) => "BadArgs",
            CoreError::ToolNotVisible(_) => "ToolNotVisible",
            CoreError::ToolMissing(_) => "ToolMissing",
            CoreError::Timeout(_) => "Timeout",
            CoreError::Cancelled => "Cancelled",
            CoreError::StepBudgetExhausted(_) => "StepBudgetExhausted",
            CoreError::WorkspacePathEscape(_) => "WorkspacePathEscape",
            CoreError::FileTooLarge { .. } => "FileTooLarge",
            CoreError::NotFound(_) => "NotFound",
            CoreError::ConflictNotFound(_) => "ConflictNotFound",
            CoreError::JobConflict(_) => "JobConflict",
            CoreError::JobStuck(_) => "JobStuck",
            CoreError::JobFailed { .. } => "JobFailed",
            CoreError::Persistence(_) => "PersistenceError",
            CoreError::Provider(_) => "ProviderError",
            CoreError::Io(_) => "IoError",
        }
    }

    /// Whether this error should terminate the agent turn rather than be
    /// surfaced to the model as a tool result.
    pub fn is_fatal_to_turn(&self) -> bool {
        matches!(
            self,
            CoreError::StepBudgetExhausted(_)
                | CoreError::Cancelled
                | CoreError::Persistence(_)
                | CoreError::Provider(_)
        )
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::BadArgs(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(CoreError::SessionNotFound("x".into()).code(), "SessionNotFound");
        assert_eq!(CoreError::Cancelled.code(), "Cancelled");
        assert_eq!(
            CoreError::Persistence("disk full".into()).code(),
            "PersistenceError"
        );
    }

    #[test]
    fn fatal_classification() {
        assert!(CoreError::Cancelled.is_fatal_to_turn());
        assert!(CoreError::StepBudgetExhausted(40).is_fatal_to_turn());
        assert!(!CoreError::ToolNotVisible("synth".into()).is_fatal_to_turn());
        assert!(!CoreError::NotFound("a.v".into()).is_fatal_to_turn());
    }
}
