//! Claim state machine
//!
//! The only place claim status changes. It checks the adjacency table, stamps
//! lifecycle timestamps and emits one audit entry per transition. It never
//! looks at rule results or scores.
//!
//! ```text
//! DRAFT -> SUBMITTED -> EXTRACTED -> VALIDATED -> AUTO_APPROVED -> CLOSED
//!              |            |            |
//!              +------------+------------+--> PENDING_REVIEW -> APPROVED/DENIED -> CLOSED
//!                                                   |
//!                                                   +--> PENDED -> SUBMITTED
//! ```

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use core_kernel::UserId;

use crate::audit::{AuditAction, AuditEntry};
use crate::claim::{Claim, ClaimStatus};
use crate::error::ClaimError;

use ClaimStatus::*;

const ADJACENCY: [(ClaimStatus, &[ClaimStatus]); 10] = [
    (Draft, &[Submitted]),
    (Submitted, &[Extracted, PendingReview]),
    (Extracted, &[Validated, PendingReview]),
    (Validated, &[AutoApproved, PendingReview, Approved, Denied]),
    (PendingReview, &[Approved, Denied, Pended]),
    (Pended, &[Submitted, Approved, Denied]),
    (AutoApproved, &[Closed]),
    (Approved, &[Closed]),
    (Denied, &[Closed]),
    (Closed, &[]),
];

/// Statuses reachable from `from` in one step
pub fn allowed_transitions(from: ClaimStatus) -> &'static [ClaimStatus] {
    ADJACENCY
        .iter()
        .find(|(status, _)| *status == from)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

pub fn can_transition(from: ClaimStatus, to: ClaimStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// A committed-to-be status change and its audit entry
#[derive(Debug, Clone)]
pub struct Transition {
    pub claim: Claim,
    pub audit: AuditEntry,
}

impl Transition {
    /// Attaches free-text notes to the audit entry
    pub fn with_notes(mut self, notes: Option<&str>) -> Self {
        if let Some(notes) = notes {
            self.audit = self.audit.with_metadata(json!({ "notes": notes }));
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimStateMachine;

impl ClaimStateMachine {
    /// Moves a claim to `target`
    ///
    /// Returns the updated copy; the input is untouched so a rejected
    /// transition leaves no trace.
    pub fn transition(
        claim: &Claim,
        target: ClaimStatus,
        actor: Option<UserId>,
    ) -> Result<Transition, ClaimError> {
        Self::transition_at(claim, target, actor, Utc::now())
    }

    pub fn transition_at(
        claim: &Claim,
        target: ClaimStatus,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<Transition, ClaimError> {
        let from = claim.status;
        if !can_transition(from, target) {
            return Err(ClaimError::IllegalTransition { from, to: target });
        }

        let mut next = claim.clone();
        next.status = target;
        next.updated_at = at;

        match target {
            Submitted => {
                if next.submitted_at.is_none() {
                    next.submitted_at = Some(at);
                }
            }
            AutoApproved | Approved | Denied => next.processed_at = Some(at),
            _ => {}
        }

        debug!(claim_id = %claim.id, %from, to = %target, "Claim status transition");

        let audit = AuditEntry::for_claim(claim.id, AuditAction::StatusChange, actor)
            .with_before(json!({ "status": from }))
            .with_after(json!({ "status": target }));

        Ok(Transition { claim: next, audit })
    }
}
