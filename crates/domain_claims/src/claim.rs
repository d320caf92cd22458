//! Claim aggregate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::{ClaimId, Currency, Money, PlanId, UserId};

use crate::error::ClaimError;

/// Claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Created but not yet submitted by the claimant
    Draft,
    /// Submitted, awaiting extraction
    Submitted,
    /// Field extraction finished
    Extracted,
    /// Validation rules were run
    Validated,
    /// Approved by the system without human review
    AutoApproved,
    /// Waiting in the agent review queue
    PendingReview,
    /// Approved by an agent
    Approved,
    /// Denied by an agent
    Denied,
    /// Put on hold pending more information
    Pended,
    /// Terminal
    Closed,
}

impl ClaimStatus {
    /// Every status, in lifecycle order
    pub const ALL: [ClaimStatus; 10] = [
        ClaimStatus::Draft,
        ClaimStatus::Submitted,
        ClaimStatus::Extracted,
        ClaimStatus::Validated,
        ClaimStatus::AutoApproved,
        ClaimStatus::PendingReview,
        ClaimStatus::Approved,
        ClaimStatus::Denied,
        ClaimStatus::Pended,
        ClaimStatus::Closed,
    ];

    /// Returns the storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Draft => "DRAFT",
            ClaimStatus::Submitted => "SUBMITTED",
            ClaimStatus::Extracted => "EXTRACTED",
            ClaimStatus::Validated => "VALIDATED",
            ClaimStatus::AutoApproved => "AUTO_APPROVED",
            ClaimStatus::PendingReview => "PENDING_REVIEW",
            ClaimStatus::Approved => "APPROVED",
            ClaimStatus::Denied => "DENIED",
            ClaimStatus::Pended => "PENDED",
            ClaimStatus::Closed => "CLOSED",
        }
    }

    /// A decision has been reached and the claim can no longer be deleted
    pub fn is_decided(&self) -> bool {
        matches!(
            self,
            ClaimStatus::Approved
                | ClaimStatus::Denied
                | ClaimStatus::AutoApproved
                | ClaimStatus::Closed
        )
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        ClaimStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| ClaimError::InvalidInput(format!("unknown claim status: {s}")))
    }
}

/// Benefit category of a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimCategory {
    Medical,
    Dental,
    Vision,
    Pharmacy,
    MentalHealth,
    Hospital,
    Emergency,
    Preventive,
    #[default]
    Other,
}

impl ClaimCategory {
    pub const ALL: [ClaimCategory; 9] = [
        ClaimCategory::Medical,
        ClaimCategory::Dental,
        ClaimCategory::Vision,
        ClaimCategory::Pharmacy,
        ClaimCategory::MentalHealth,
        ClaimCategory::Hospital,
        ClaimCategory::Emergency,
        ClaimCategory::Preventive,
        ClaimCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimCategory::Medical => "medical",
            ClaimCategory::Dental => "dental",
            ClaimCategory::Vision => "vision",
            ClaimCategory::Pharmacy => "pharmacy",
            ClaimCategory::MentalHealth => "mental_health",
            ClaimCategory::Hospital => "hospital",
            ClaimCategory::Emergency => "emergency",
            ClaimCategory::Preventive => "preventive",
            ClaimCategory::Other => "other",
        }
    }

    /// Maps a claim type reported by the extractor onto a category
    ///
    /// Generic types such as `insurance` or `travel` land on `Other`.
    pub fn from_detected_type(detected: &str) -> ClaimCategory {
        match detected.trim().to_ascii_lowercase().as_str() {
            "medical" | "health" | "doctor" => ClaimCategory::Medical,
            "dental" => ClaimCategory::Dental,
            "vision" => ClaimCategory::Vision,
            "pharmacy" | "prescription" => ClaimCategory::Pharmacy,
            "mental_health" => ClaimCategory::MentalHealth,
            "hospital" => ClaimCategory::Hospital,
            "emergency" => ClaimCategory::Emergency,
            "preventive" => ClaimCategory::Preventive,
            _ => ClaimCategory::Other,
        }
    }

    /// Guesses a category from free OCR text, first keyword group wins
    pub fn from_keywords(text: &str) -> Option<ClaimCategory> {
        const GROUPS: [(ClaimCategory, &[&str]); 8] = [
            (
                ClaimCategory::Dental,
                &["dental", "dentist", "tooth", "teeth", "orthodont"],
            ),
            (
                ClaimCategory::Vision,
                &["vision", "eye", "optical", "glasses", "lens", "optometr"],
            ),
            (
                ClaimCategory::Pharmacy,
                &["pharmacy", "prescription", "rx", "drug", "medication"],
            ),
            (
                ClaimCategory::MentalHealth,
                &["mental", "psych", "counsel", "therapy", "behavioral"],
            ),
            (
                ClaimCategory::Hospital,
                &["hospital", "inpatient", "admission"],
            ),
            (
                ClaimCategory::Emergency,
                &["emergency", "er ", "urgent care", "ambulance"],
            ),
            (
                ClaimCategory::Preventive,
                &["preventive", "annual", "checkup", "physical", "vaccine", "screening"],
            ),
            (
                ClaimCategory::Medical,
                &["medical", "doctor", "clinic", "physician", "health", "patient"],
            ),
        ];

        let lowered = text.to_lowercase();
        GROUPS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
            .map(|(category, _)| *category)
    }
}

impl fmt::Display for ClaimCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimCategory {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ClaimCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == wanted)
            .ok_or_else(|| ClaimError::InvalidInput(format!("unknown claim category: {s}")))
    }
}

/// An insurance claim moving through the decision pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Unique identifier
    pub id: ClaimId,
    /// Human-readable claim number, `CLM-YYYYMMDD-XXXXXXXX`
    pub claim_number: String,
    /// Claimant
    pub claimant_id: UserId,
    /// Benefit plan the claim is filed against
    pub plan_id: Option<PlanId>,
    /// Agent working the claim
    pub assigned_agent_id: Option<UserId>,
    pub status: ClaimStatus,
    pub category: ClaimCategory,
    /// Billed amount; zero until known
    pub total_amount: Money,
    pub approved_amount: Option<Money>,
    pub service_date: Option<NaiveDate>,
    pub provider_name: Option<String>,
    pub provider_npi: Option<String>,
    pub provider_type: Option<String>,
    pub diagnosis_codes: Vec<String>,
    pub procedure_codes: Vec<String>,
    pub description: Option<String>,
    /// Average OCR quality across the claim's documents
    pub ocr_quality_score: Option<f64>,
    /// Confidence reported by field extraction
    pub extraction_confidence: Option<f64>,
    /// Highest similarity among recorded duplicate matches
    pub duplicate_score: f64,
    /// Precomputed fraud risk, 0..=1
    pub fraud_risk_score: f64,
    pub auto_approval_eligible: bool,
    pub auto_approval_reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// First submission time; resubmissions keep it
    pub submitted_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped by every commit
    pub version: i64,
}

impl Claim {
    /// Creates a new draft claim
    pub fn draft(claimant_id: UserId, total_amount: Money) -> Self {
        let now = Utc::now();

        Self {
            id: ClaimId::new_v7(),
            claim_number: generate_claim_number(now),
            claimant_id,
            plan_id: None,
            assigned_agent_id: None,
            status: ClaimStatus::Draft,
            category: ClaimCategory::Other,
            total_amount,
            approved_amount: None,
            service_date: None,
            provider_name: None,
            provider_npi: None,
            provider_type: None,
            diagnosis_codes: Vec::new(),
            procedure_codes: Vec::new(),
            description: None,
            ocr_quality_score: None,
            extraction_confidence: None,
            duplicate_score: 0.0,
            fraud_risk_score: 0.0,
            auto_approval_eligible: false,
            auto_approval_reasons: Vec::new(),
            created_at: now,
            updated_at: now,
            submitted_at: None,
            processed_at: None,
            deleted_at: None,
            version: 0,
        }
    }

    /// Currency the claim is billed in
    pub fn currency(&self) -> Currency {
        self.total_amount.currency()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether a named attribute carries a non-empty value
    ///
    /// Unknown attribute names count as missing.
    pub fn has_field(&self, name: &str) -> bool {
        fn filled(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }

        match name {
            "claim_number" => !self.claim_number.is_empty(),
            "claimant_id" | "user_id" => true,
            "plan_id" => self.plan_id.is_some(),
            "assigned_agent_id" => self.assigned_agent_id.is_some(),
            "category" => true,
            "total_amount" => !self.total_amount.is_zero(),
            "currency" => true,
            "service_date" => self.service_date.is_some(),
            "provider_name" => filled(&self.provider_name),
            "provider_npi" => filled(&self.provider_npi),
            "provider_type" => filled(&self.provider_type),
            "diagnosis_codes" => !self.diagnosis_codes.is_empty(),
            "procedure_codes" => !self.procedure_codes.is_empty(),
            "description" => filled(&self.description),
            _ => false,
        }
    }

    /// Diagnosis and procedure codes together
    pub fn all_codes(&self) -> impl Iterator<Item = &str> {
        self.diagnosis_codes
            .iter()
            .chain(self.procedure_codes.iter())
            .map(String::as_str)
    }
}

/// Generates a claim number of the form `CLM-20240115-1A2B3C4D`
pub fn generate_claim_number(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "CLM-{}-{}",
        now.format("%Y%m%d"),
        random[..8].to_ascii_uppercase()
    )
}
