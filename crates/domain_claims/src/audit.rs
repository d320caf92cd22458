//! Audit trail
//!
//! Every status change and decision leaves exactly one append-only entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use core_kernel::{AuditEntryId, ClaimId, DomainPort, PortError, UserId};

use crate::error::ClaimError;

/// Entity type recorded for claim entries
pub const CLAIM_ENTITY: &str = "claim";

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    StatusChange,
    AutoApprove,
    RouteToReview,
    Decision,
    Assign,
    DocumentAdded,
    SoftDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::StatusChange => "status_change",
            AuditAction::AutoApprove => "auto_approve",
            AuditAction::RouteToReview => "route_to_review",
            AuditAction::Decision => "decision",
            AuditAction::Assign => "assign",
            AuditAction::DocumentAdded => "document_added",
            AuditAction::SoftDelete => "soft_delete",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditAction::Create),
            "status_change" => Ok(AuditAction::StatusChange),
            "auto_approve" => Ok(AuditAction::AutoApprove),
            "route_to_review" => Ok(AuditAction::RouteToReview),
            "decision" => Ok(AuditAction::Decision),
            "assign" => Ok(AuditAction::Assign),
            "document_added" => Ok(AuditAction::DocumentAdded),
            "soft_delete" => Ok(AuditAction::SoftDelete),
            other => Err(ClaimError::InvalidInput(format!("unknown audit action: {other}"))),
        }
    }
}

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub entity_type: String,
    pub entity_id: String,
    pub action: AuditAction,
    /// `None` for system actions
    pub actor_id: Option<UserId>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl fmt::Display,
        action: AuditAction,
        actor_id: Option<UserId>,
    ) -> Self {
        Self {
            id: AuditEntryId::new_v7(),
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            action,
            actor_id,
            before: None,
            after: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// An entry about a claim
    pub fn for_claim(claim_id: ClaimId, action: AuditAction, actor_id: Option<UserId>) -> Self {
        Self::new(CLAIM_ENTITY, claim_id, action, actor_id)
    }

    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Append-only audit log
#[async_trait]
pub trait AuditSink: DomainPort {
    /// Appends one entry
    async fn append(&self, entry: AuditEntry) -> Result<(), PortError>;

    /// Entries for one entity, oldest first
    async fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>, PortError>;
}
