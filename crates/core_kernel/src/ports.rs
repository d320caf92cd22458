//! Error vocabulary shared by storage ports
//!
//! The port traits themselves (`ClaimStore`, `AuditSink`) live next to the
//! claims domain. This module only fixes how any adapter reports failure,
//! so the decision service can tell a lost race from a missing row without
//! knowing whether PostgreSQL or the in-memory store sits behind the port.

use std::fmt;
use thiserror::Error;

type Source = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a port adapter
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// Input the adapter refused to store
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Lost compare-and-set or duplicate key
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Backend unreachable; retrying may help
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Source>,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Source>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error as `Internal`, keeping it as the source
    pub fn internal_from(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Bound shared by every port trait, so adapters can sit behind an `Arc`
/// and be used from spawned tasks
pub trait DomainPort: Send + Sync + 'static {}
