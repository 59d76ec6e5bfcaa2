//! Error types for the bulk processing pipeline.
//!
//! Per-item business failures are never errors at this level: they are recorded
//! as item state (`ItemState::Error` plus `error_detail`) and surface through the
//! progress snapshot. Only the variants below cross the API boundary.

use crate::config::ConfigurationError;
use crate::models::{ItemId, SessionId};
use crate::state_machine::{GuardError, StateMachineError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Payload or session input is structurally invalid before processing begins
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller attempted an illegal item state change; session state unchanged
    #[error("Invalid transition for item {item_id}: {reason}")]
    InvalidTransition { item_id: ItemId, reason: String },

    /// Operation not legal for the session's current status
    #[error("Invalid session state for {session_id}: {reason}")]
    InvalidState {
        session_id: SessionId,
        reason: String,
    },

    /// The processing function failed systemically; the session was aborted
    #[error("Session {session_id} aborted: {reason}")]
    FatalSession {
        session_id: SessionId,
        reason: String,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Item {item_id} not found in session {session_id}")]
    ItemNotFound {
        session_id: SessionId,
        item_id: ItemId,
    },

    /// A phase guard rejected forward advancement
    #[error("Cannot leave phase {phase}: {reason}")]
    GuardFailed { phase: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("State machine error: {0}")]
    StateMachine(String),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for the one error class that aborts a whole session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalSession { .. })
    }
}

impl From<StateMachineError> for PipelineError {
    fn from(err: StateMachineError) -> Self {
        PipelineError::StateMachine(err.to_string())
    }
}

impl From<GuardError> for PipelineError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Rejected { phase, reason } => PipelineError::GuardFailed { phase, reason },
            other => PipelineError::StateMachine(other.to_string()),
        }
    }
}

impl From<ConfigurationError> for PipelineError {
    fn from(err: ConfigurationError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let fatal = PipelineError::FatalSession {
            session_id: SessionId::new(),
            reason: "disk full".to_string(),
        };
        assert!(fatal.is_fatal());
        assert!(!PipelineError::validation("bad").is_fatal());
    }

    #[test]
    fn test_guard_error_maps_to_guard_failed() {
        let err: PipelineError = GuardError::Rejected {
            phase: "map".to_string(),
            reason: "email is not mapped".to_string(),
        }
        .into();

        assert_eq!(
            err,
            PipelineError::GuardFailed {
                phase: "map".to_string(),
                reason: "email is not mapped".to_string(),
            }
        );
        assert_eq!(err.to_string(), "Cannot leave phase map: email is not mapped");
    }
}
