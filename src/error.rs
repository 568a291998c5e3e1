//! Error Types
//!
//! Expected wizard conditions (a blocked step, a failed connect attempt, a
//! stale result after close) are *outcomes*, not errors. The types here cover
//! programmer misuse of the controller and the failures reported by the
//! persistence and action ports.

use std::time::Duration;

/// Misuse of the wizard controller.
///
/// Correct renderer code never sees these; they exist so that a host calling
/// operations out of order fails loudly instead of corrupting state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("wizard has not been started")]
    NotStarted,

    #[error("wizard is already in progress")]
    AlreadyStarted,

    #[error("wizard has been closed")]
    Closed,

    #[error("wizard already completed; reset() to begin a new session")]
    AlreadyCompleted,

    #[error("no resume offer is pending")]
    NoPendingResume,

    #[error("step index {index} is out of range (registry has {len} steps)")]
    UnknownStep { index: usize, len: usize },

    #[error("step registry is empty")]
    EmptyRegistry,
}

/// Failure of a step's asynchronous action.
///
/// Always recoverable: the controller clears `busy`, keeps the current index
/// and exposes the error so the user can retry or skip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("{step_id} action failed: {message}")]
    Failed { step_id: String, message: String },

    #[error("{step_id} action was rejected ({status}): {message}")]
    Rejected {
        step_id: String,
        status: u16,
        message: String,
    },

    #[error("{step_id} action timed out after {timeout:?}")]
    TimedOut { step_id: String, timeout: Duration },

    #[error("{step_id} action transport error: {message}")]
    Transport { step_id: String, message: String },

    #[error("no action registered for step {0}")]
    NotRegistered(String),
}

impl ActionError {
    pub fn failed(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            step_id: step_id.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same action may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotRegistered(_))
    }
}

/// Failure reported by a [`ProgressStore`](crate::store::ProgressStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_display() {
        let err = ActionError::TimedOut {
            step_id: "auth".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "auth action timed out after 30s");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_registered_is_not_retryable() {
        assert!(!ActionError::NotRegistered("auth".into()).is_retryable());
    }

    #[test]
    fn test_unknown_step_message() {
        let err = WizardError::UnknownStep { index: 7, len: 5 };
        assert!(err.to_string().contains("out of range"));
    }
}
