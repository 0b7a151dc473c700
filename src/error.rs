//! # Crate Error Types
//!
//! Top-level error for plan execution. Each layer keeps its own `thiserror`
//! enum; `RelayError` wraps them so callers deal with a single type.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::plan::ValidationError;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Channel unreachable, publish or read failure. Fatal for the run.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Plan validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// An execution state broke one of its structural invariants.
    #[error("State transition error: {0}")]
    StateTransition(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl RelayError {
    pub fn state_transition(message: impl Into<String>) -> Self {
        Self::StateTransition(message.into())
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }

    /// True for errors coming from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Messaging(err) if err.is_transport())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let err = RelayError::from(MessagingError::connection("refused"));
        assert!(err.is_transport());

        let err = RelayError::state_transition("step out of range");
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "State transition error: step out of range");
    }
}
