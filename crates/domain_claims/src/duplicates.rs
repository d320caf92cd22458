//! Heuristic duplicate detection
//!
//! A claim is compared with the claimant's other live claims. Each attribute
//! both claims carry contributes a fixed weight; pairs scoring at or above the
//! threshold become [`DuplicateMatch`] rows.

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use core_kernel::{ClaimId, DuplicateMatchId};

use crate::claim::{Claim, ClaimStatus};

/// Reason recorded for a content-hash match
pub const EXACT_FILE_DUPLICATE: &str = "Exact file duplicate (same file hash)";

// Weights in hundredths so that sums stay exact
const AMOUNT_WEIGHT: u32 = 30;
const DATE_WEIGHT: u32 = 30;
const PROVIDER_WEIGHT: u32 = 20;
const CATEGORY_WEIGHT: u32 = 10;
const PROCEDURE_WEIGHT: u32 = 10;

const MAX_DATE_GAP_DAYS: i64 = 7;

/// A recorded similarity between a claim and an earlier claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub id: DuplicateMatchId,
    pub claim_id: ClaimId,
    pub matched_claim_id: ClaimId,
    pub similarity_score: f64,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DuplicateMatch {
    pub fn new(claim_id: ClaimId, matched_claim_id: ClaimId, similarity_score: f64, reasons: Vec<String>) -> Self {
        Self {
            id: DuplicateMatchId::new_v7(),
            claim_id,
            matched_claim_id,
            similarity_score,
            reasons,
            created_at: Utc::now(),
        }
    }

    /// A match forced by identical document content
    pub fn exact(claim_id: ClaimId, original_claim_id: ClaimId) -> Self {
        Self::new(
            claim_id,
            original_claim_id,
            1.0,
            vec![EXACT_FILE_DUPLICATE.to_string()],
        )
    }

    /// Identity of the ordered pair
    pub fn pair(&self) -> (ClaimId, ClaimId) {
        (self.claim_id, self.matched_claim_id)
    }
}

/// Weighted similarity between two claims
#[derive(Debug, Clone, PartialEq)]
pub struct Similarity {
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Scores claims against each other
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateDetector;

impl DuplicateDetector {
    /// True for claims that may serve as comparison candidates for `claim`
    pub fn is_candidate(claim: &Claim, other: &Claim) -> bool {
        other.id != claim.id
            && other.claimant_id == claim.claimant_id
            && !other.is_deleted()
            && !matches!(other.status, ClaimStatus::Draft | ClaimStatus::Denied)
    }

    /// Similarity of `other` to `claim`, capped at 1.0
    pub fn similarity(claim: &Claim, other: &Claim) -> Similarity {
        let mut points = 0u32;
        let mut reasons = Vec::new();

        if !claim.total_amount.is_zero() && !other.total_amount.is_zero() {
            if let Ok(ratio) = claim.total_amount.relative_difference(&other.total_amount) {
                if ratio < dec!(0.05) {
                    points += AMOUNT_WEIGHT;
                    reasons.push(format!(
                        "Similar amount: {} vs {}",
                        claim.total_amount, other.total_amount
                    ));
                }
            }
        }

        if let (Some(a), Some(b)) = (claim.service_date, other.service_date) {
            let gap = (a - b).num_days().abs();
            if gap <= MAX_DATE_GAP_DAYS {
                points += DATE_WEIGHT;
                reasons.push(format!("Similar date: {gap} days apart"));
            }
        }

        if let (Some(a), Some(b)) = (claim.provider_name.as_deref(), other.provider_name.as_deref()) {
            if !a.is_empty() && a.to_lowercase() == b.to_lowercase() {
                points += PROVIDER_WEIGHT;
                reasons.push(format!("Same provider: {a}"));
            }
        }

        if claim.category == other.category {
            points += CATEGORY_WEIGHT;
            reasons.push(format!("Same category: {}", claim.category));
        }

        let mine: BTreeSet<&str> = claim.procedure_codes.iter().map(String::as_str).collect();
        let common: Vec<&str> = other
            .procedure_codes
            .iter()
            .map(String::as_str)
            .filter(|code| mine.contains(code))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !common.is_empty() {
            points += PROCEDURE_WEIGHT;
            reasons.push(format!("Common procedure codes: {}", common.join(", ")));
        }

        Similarity {
            score: (f64::from(points) / 100.0).min(1.0),
            reasons,
        }
    }

    /// Matches at or above `threshold` among the candidates in `pool`
    ///
    /// Non-candidates in the pool (other claimants, drafts, denied or
    /// deleted claims, the claim itself) are ignored.
    pub fn find_duplicates(claim: &Claim, pool: &[Claim], threshold: f64) -> Vec<DuplicateMatch> {
        pool.iter()
            .filter(|other| Self::is_candidate(claim, other))
            .filter_map(|other| {
                let similarity = Self::similarity(claim, other);
                (similarity.score >= threshold).then(|| {
                    DuplicateMatch::new(claim.id, other.id, similarity.score, similarity.reasons)
                })
            })
            .collect()
    }

    /// Drops matches whose pair is already recorded or repeated
    pub fn new_matches(existing: &[DuplicateMatch], found: Vec<DuplicateMatch>) -> Vec<DuplicateMatch> {
        let mut seen: BTreeSet<(ClaimId, ClaimId)> = existing.iter().map(DuplicateMatch::pair).collect();
        found
            .into_iter()
            .filter(|m| seen.insert(m.pair()))
            .collect()
    }
}

/// The claim's duplicate score: highest similarity among its matches, or 0.0
pub fn duplicate_score<'a>(matches: impl IntoIterator<Item = &'a DuplicateMatch>) -> f64 {
    matches
        .into_iter()
        .map(|m| m.similarity_score)
        .fold(0.0, f64::max)
}
