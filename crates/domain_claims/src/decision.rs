//! Claim decisions
//!
//! A `Decision` is written once per decision event and never changed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{ClaimId, DecisionId, Money, UserId};

use crate::claim::{Claim, ClaimStatus};
use crate::error::ClaimError;

pub const AUTO_APPROVED_REASON_CODE: &str = "AUTO_APPROVED";
pub const AUTO_APPROVED_DESCRIPTION: &str = "Claim met all auto-approval criteria";

/// Outcome chosen for a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Approved,
    Denied,
    Pended,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Approved => "approved",
            DecisionType::Denied => "denied",
            DecisionType::Pended => "pended",
        }
    }

    /// Status a human decision moves the claim to
    pub fn target_status(&self) -> ClaimStatus {
        match self {
            DecisionType::Approved => ClaimStatus::Approved,
            DecisionType::Denied => ClaimStatus::Denied,
            DecisionType::Pended => ClaimStatus::Pended,
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionType {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Ok(DecisionType::Approved),
            "denied" | "deny" => Ok(DecisionType::Denied),
            "pended" | "pend" => Ok(DecisionType::Pended),
            other => Err(ClaimError::InvalidInput(format!("unknown decision: {other}"))),
        }
    }
}

/// What an agent submits when deciding a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub decision: DecisionType,
    /// Defaults to the claim total for approvals
    pub approved_amount: Option<Money>,
    pub reason_code: Option<String>,
    pub reason_description: Option<String>,
    pub notes: Option<String>,
}

impl DecisionRequest {
    pub fn new(decision: DecisionType) -> Self {
        Self {
            decision,
            approved_amount: None,
            reason_code: None,
            reason_description: None,
            notes: None,
        }
    }

    pub fn approve() -> Self {
        Self::new(DecisionType::Approved)
    }

    pub fn deny(reason_code: impl Into<String>) -> Self {
        Self {
            reason_code: Some(reason_code.into()),
            ..Self::new(DecisionType::Denied)
        }
    }

    pub fn pend(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Self::new(DecisionType::Pended)
        }
    }
}

/// A recorded decision on a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub claim_id: ClaimId,
    pub decision: DecisionType,
    pub is_auto_decision: bool,
    pub approved_amount: Option<Money>,
    pub reason_code: Option<String>,
    pub reason_description: Option<String>,
    pub notes: Option<String>,
    /// Justifications for auto decisions
    pub reasons: Vec<String>,
    /// `None` for system decisions
    pub decided_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    /// The system approval of an eligible claim for its full amount
    pub fn auto_approval(claim: &Claim, reasons: Vec<String>) -> Self {
        Self {
            id: DecisionId::new_v7(),
            claim_id: claim.id,
            decision: DecisionType::Approved,
            is_auto_decision: true,
            approved_amount: Some(claim.total_amount),
            reason_code: Some(AUTO_APPROVED_REASON_CODE.to_string()),
            reason_description: Some(AUTO_APPROVED_DESCRIPTION.to_string()),
            notes: Some(format!("Auto-approved based on: {}", reasons.join(", "))),
            reasons,
            decided_by: None,
            created_at: Utc::now(),
        }
    }

    /// A decision taken by an agent
    pub fn human(claim: &Claim, request: &DecisionRequest, decider: UserId) -> Self {
        let approved_amount = match request.decision {
            DecisionType::Approved => Some(request.approved_amount.unwrap_or(claim.total_amount)),
            DecisionType::Denied | DecisionType::Pended => None,
        };

        Self {
            id: DecisionId::new_v7(),
            claim_id: claim.id,
            decision: request.decision,
            is_auto_decision: false,
            approved_amount,
            reason_code: request.reason_code.clone(),
            reason_description: request.reason_description.clone(),
            notes: request.notes.clone(),
            reasons: Vec::new(),
            decided_by: Some(decider),
            created_at: Utc::now(),
        }
    }
}
