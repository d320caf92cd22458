//! Claims domain errors

use core_kernel::PortError;
use thiserror::Error;

use crate::claim::ClaimStatus;

/// Errors that can occur in the claims domain
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid status transition from {from} to {to}")]
    IllegalTransition { from: ClaimStatus, to: ClaimStatus },

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(PortError),
}

impl ClaimError {
    /// Returns true when the caller lost a compare-and-set race
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClaimError::Conflict(_))
    }
}

impl From<PortError> for ClaimError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => ClaimError::NotFound { entity_type, id },
            PortError::Conflict { message } => ClaimError::Conflict(message),
            other => ClaimError::Store(other),
        }
    }
}

impl From<config::ConfigError> for ClaimError {
    fn from(err: config::ConfigError) -> Self {
        ClaimError::Configuration(err.to_string())
    }
}
