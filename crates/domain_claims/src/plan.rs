//! Benefit plans and member policies
//!
//! Both are reference data: the pipeline reads them and never writes them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Currency, MemberPolicyId, Money, PlanId, UserId};

use crate::error::ClaimError;

/// A benefit plan with its auto-approval thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub is_active: bool,
    pub auto_approve_enabled: bool,
    /// Highest amount the system may approve on its own; zero allows nothing
    pub auto_approve_amount_cap: Money,
    pub min_ocr_quality_score: f64,
    pub min_confidence_score: f64,
    pub max_duplicate_score: f64,
    pub max_fraud_risk_score: f64,
    /// Similarity at or above which a duplicate match is recorded
    pub duplicate_match_threshold: f64,
    /// Document types every claim must carry before auto-approval
    pub required_documents: Vec<String>,
}

impl Plan {
    /// Creates an active plan with auto-approval switched off
    pub fn new(name: impl Into<String>, currency: Currency) -> Self {
        Self {
            id: PlanId::new_v7(),
            name: name.into(),
            is_active: true,
            auto_approve_enabled: false,
            auto_approve_amount_cap: Money::zero(currency),
            min_ocr_quality_score: 0.8,
            min_confidence_score: 0.85,
            max_duplicate_score: 0.3,
            max_fraud_risk_score: 0.2,
            duplicate_match_threshold: 0.6,
            required_documents: Vec::new(),
        }
    }
}

/// Status of a member's enrolment in a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Active,
    Inactive,
    Suspended,
    Expired,
}

impl PolicyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyStatus::Active => "active",
            PolicyStatus::Inactive => "inactive",
            PolicyStatus::Suspended => "suspended",
            PolicyStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyStatus {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(PolicyStatus::Active),
            "inactive" => Ok(PolicyStatus::Inactive),
            "suspended" => Ok(PolicyStatus::Suspended),
            "expired" => Ok(PolicyStatus::Expired),
            other => Err(ClaimError::InvalidInput(format!(
                "unknown policy status: {other}"
            ))),
        }
    }
}

/// A claimant's enrolment in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPolicy {
    pub id: MemberPolicyId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub member_number: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: PolicyStatus,
}

impl MemberPolicy {
    /// Creates an active, open-ended policy
    pub fn active(user_id: UserId, plan_id: PlanId, member_number: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            id: MemberPolicyId::new_v7(),
            user_id,
            plan_id,
            member_number: member_number.into(),
            start_date,
            end_date: None,
            status: PolicyStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PolicyStatus::Active
    }

    /// Days between `date` and the policy's period, 0 when inside it
    pub fn days_outside(&self, date: NaiveDate) -> i64 {
        if date < self.start_date {
            return (self.start_date - date).num_days();
        }
        match self.end_date {
            Some(end) if date > end => (date - end).num_days(),
            _ => 0,
        }
    }

    /// Whether `date` falls within the start and end dates, inclusive
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.days_outside(date) == 0
    }
}
