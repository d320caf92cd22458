//! Auto-approval eligibility
//!
//! Combines the plan's thresholds, the validation summary and the claim's
//! precomputed scores into a verdict. Every failing condition is reported, not
//! just the first.

use serde::{Deserialize, Serialize};

use crate::claim::Claim;
use crate::config::EngineConfig;
use crate::document::{missing_types, ClaimDocument};
use crate::plan::Plan;
use crate::rules::checks::percent;
use crate::rules::ValidationSummary;

/// Inputs to one evaluation
#[derive(Debug, Clone, Copy)]
pub struct AutoApprovalInput<'a> {
    pub claim: &'a Claim,
    /// The claim's plan, if it has one and it was found
    pub plan: Option<&'a Plan>,
    pub documents: &'a [ClaimDocument],
    pub summary: &'a ValidationSummary,
}

/// Eligibility verdict with itemized reasons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoApprovalVerdict {
    pub eligible: bool,
    /// Justifications for the conditions that held
    pub passed: Vec<String>,
    /// One entry per failing condition
    pub failures: Vec<String>,
}

impl AutoApprovalVerdict {
    /// Reasons to store on the claim: justifications when eligible,
    /// failures otherwise
    pub fn reasons(&self) -> &[String] {
        if self.eligible {
            &self.passed
        } else {
            &self.failures
        }
    }
}

/// Decides whether a claim may be approved without human review
#[derive(Debug, Clone)]
pub struct AutoApprovalEvaluator {
    fallback_min_confidence: f64,
    fallback_max_fraud: f64,
}

impl Default for AutoApprovalEvaluator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl AutoApprovalEvaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            fallback_min_confidence: config.min_confidence_score,
            fallback_max_fraud: config.max_fraud_risk_score,
        }
    }

    pub fn evaluate(&self, input: &AutoApprovalInput<'_>) -> AutoApprovalVerdict {
        let claim = input.claim;
        let mut passed = Vec::new();
        let mut failures = Vec::new();

        match (claim.plan_id, input.plan) {
            (None, _) => failures.push("No plan associated with claim".to_string()),
            (Some(_), None) => failures.push("Plan not found".to_string()),
            (Some(_), Some(plan)) if !plan.auto_approve_enabled => {
                failures.push("Auto-approval not enabled for this plan".to_string())
            }
            (Some(_), Some(plan)) if !plan.is_active => {
                failures.push("Plan is not active".to_string())
            }
            (Some(_), Some(plan)) => {
                let plan_failures = plan_thresholds(claim, plan, input.documents);
                if plan_failures.is_empty() {
                    passed.push(format!("Plan {} allows auto-approval", plan.name));
                }
                failures.extend(plan_failures);
            }
        }

        if input.summary.is_valid {
            passed.push("All validation rules passed".to_string());
        } else {
            failures.extend(input.summary.error_messages.iter().cloned());
        }

        let min_confidence = input
            .plan
            .map(|plan| plan.min_confidence_score)
            .unwrap_or(self.fallback_min_confidence);
        match claim.extraction_confidence {
            Some(confidence) if confidence >= min_confidence => passed.push(format!(
                "Extraction confidence {} meets threshold",
                percent(confidence)
            )),
            Some(confidence) => failures.push(format!(
                "Extraction confidence {} below threshold {}",
                percent(confidence),
                percent(min_confidence)
            )),
            None => failures.push("Extraction confidence unavailable".to_string()),
        }

        let max_fraud = input
            .plan
            .map(|plan| plan.max_fraud_risk_score)
            .unwrap_or(self.fallback_max_fraud);
        if claim.fraud_risk_score > max_fraud {
            failures.push(format!(
                "Fraud risk score {} exceeds threshold {}",
                percent(claim.fraud_risk_score),
                percent(max_fraud)
            ));
        } else {
            passed.push(format!(
                "Fraud risk score {} within acceptable range",
                percent(claim.fraud_risk_score)
            ));
        }

        AutoApprovalVerdict {
            eligible: failures.is_empty(),
            passed,
            failures,
        }
    }
}

fn plan_thresholds(claim: &Claim, plan: &Plan, documents: &[ClaimDocument]) -> Vec<String> {
    let mut failures = Vec::new();

    let cap = plan.auto_approve_amount_cap;
    if cap.currency() != claim.currency() {
        failures.push(format!(
            "Claim currency {} does not match auto-approve cap currency {}",
            claim.currency(),
            cap.currency()
        ));
    } else if claim.total_amount.amount() > cap.amount() {
        failures.push(format!(
            "Amount {} exceeds auto-approve cap {}",
            claim.total_amount, cap
        ));
    }

    if let Some(ocr) = claim.ocr_quality_score {
        if ocr < plan.min_ocr_quality_score {
            failures.push(format!(
                "OCR quality {} below threshold {}",
                percent(ocr),
                percent(plan.min_ocr_quality_score)
            ));
        }
    }

    if claim.duplicate_score > plan.max_duplicate_score {
        failures.push(format!(
            "Duplicate score {} exceeds threshold {}",
            percent(claim.duplicate_score),
            percent(plan.max_duplicate_score)
        ));
    }

    let missing = missing_types(&plan.required_documents, documents);
    if !missing.is_empty() {
        failures.push(format!("Missing required documents: {}", missing.join(", ")));
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Currency, Money, UserId};
    use rust_decimal_macros::dec;

    fn plan() -> Plan {
        let mut plan = Plan::new("Gold", Currency::USD);
        plan.auto_approve_enabled = true;
        plan.auto_approve_amount_cap = Money::new(dec!(500), Currency::USD);
        plan
    }

    fn claim(plan: &Plan, amount: rust_decimal::Decimal) -> Claim {
        let mut claim = Claim::draft(UserId::new(), Money::new(amount, Currency::USD));
        claim.plan_id = Some(plan.id);
        claim.ocr_quality_score = Some(0.9);
        claim.extraction_confidence = Some(0.9);
        claim.duplicate_score = 0.1;
        claim.fraud_risk_score = 0.05;
        claim
    }

    fn valid() -> ValidationSummary {
        ValidationSummary {
            is_valid: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_cap_blocks_nonzero_claims() {
        let mut plan = plan();
        plan.auto_approve_amount_cap = Money::zero(Currency::USD);
        let claim = claim(&plan, dec!(1));
        let summary = valid();
        let verdict = AutoApprovalEvaluator::default().evaluate(&AutoApprovalInput {
            claim: &claim,
            plan: Some(&plan),
            documents: &[],
            summary: &summary,
        });
        assert!(!verdict.eligible);
        assert_eq!(verdict.failures, vec!["Amount $1.00 exceeds auto-approve cap $0.00"]);
    }

    #[test]
    fn test_collects_every_failure() {
        let mut plan = plan();
        plan.required_documents = vec!["bill".into()];
        let mut claim = claim(&plan, dec!(750));
        claim.ocr_quality_score = Some(0.5);
        claim.duplicate_score = 0.7;
        claim.extraction_confidence = Some(0.5);
        claim.fraud_risk_score = 0.9;
        let summary = ValidationSummary {
            is_valid: false,
            errors: 1,
            error_messages: vec!["Service date is required".into()],
            ..Default::default()
        };

        let verdict = AutoApprovalEvaluator::default().evaluate(&AutoApprovalInput {
            claim: &claim,
            plan: Some(&plan),
            documents: &[],
            summary: &summary,
        });

        assert_eq!(
            verdict.failures,
            vec![
                "Amount $750.00 exceeds auto-approve cap $500.00",
                "OCR quality 50% below threshold 80%",
                "Duplicate score 70% exceeds threshold 30%",
                "Missing required documents: bill",
                "Service date is required",
                "Extraction confidence 50% below threshold 85%",
                "Fraud risk score 90% exceeds threshold 20%",
            ]
        );
        assert_eq!(verdict.reasons(), verdict.failures.as_slice());
    }

    #[test]
    fn test_plan_gates() {
        let plan = plan();
        let summary = valid();
        let mut orphan = claim(&plan, dec!(10));
        orphan.plan_id = None;

        let verdict = AutoApprovalEvaluator::default().evaluate(&AutoApprovalInput {
            claim: &orphan,
            plan: None,
            documents: &[],
            summary: &summary,
        });
        assert!(verdict.failures.contains(&"No plan associated with claim".to_string()));

        let lost = claim(&plan, dec!(10));
        let verdict = AutoApprovalEvaluator::default().evaluate(&AutoApprovalInput {
            claim: &lost,
            plan: None,
            documents: &[],
            summary: &summary,
        });
        assert!(verdict.failures.contains(&"Plan not found".to_string()));

        let mut disabled = plan.clone();
        disabled.auto_approve_enabled = false;
        let verdict = AutoApprovalEvaluator::default().evaluate(&AutoApprovalInput {
            claim: &lost,
            plan: Some(&disabled),
            documents: &[],
            summary: &summary,
        });
        assert!(verdict
            .failures
            .contains(&"Auto-approval not enabled for this plan".to_string()));
    }

    #[test]
    fn test_missing_confidence_fails_closed() {
        let plan = plan();
        let mut claim = claim(&plan, dec!(10));
        claim.extraction_confidence = None;
        let summary = valid();
        let verdict = AutoApprovalEvaluator::default().evaluate(&AutoApprovalInput {
            claim: &claim,
            plan: Some(&plan),
            documents: &[],
            summary: &summary,
        });
        assert!(!verdict.eligible);
    }

    #[test]
    fn test_eligible_reasons() {
        let plan = plan();
        let claim = claim(&plan, dec!(250));
        let summary = valid();
        let verdict = AutoApprovalEvaluator::default().evaluate(&AutoApprovalInput {
            claim: &claim,
            plan: Some(&plan),
            documents: &[],
            summary: &summary,
        });
        assert!(verdict.eligible);
        assert_eq!(
            verdict.reasons(),
            [
                "Plan Gold allows auto-approval",
                "All validation rules passed",
                "Extraction confidence 90% meets threshold",
                "Fraud risk score 5% within acceptable range",
            ]
        );
    }
}
