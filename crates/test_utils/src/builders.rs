//! Test Data Builders
//!
//! Provides builder patterns for constructing claims, plans and rules with
//! sensible defaults. Tests specify only the fields they care about.

use chrono::NaiveDate;
use core_kernel::{Currency, Money, PlanId, UserId};
use serde_json::{json, Value};

use domain_claims::claim::{Claim, ClaimCategory, ClaimStatus};
use domain_claims::plan::Plan;
use domain_claims::rules::{Severity, ValidationRule};

use crate::fixtures::{IdFixtures, MoneyFixtures, StringFixtures, TemporalFixtures};

/// Builder for claims
///
/// The default claim is an EXTRACTED medical claim for $250 with scores that
/// pass the standard plan's thresholds.
pub struct TestClaimBuilder {
    claim: Claim,
}

impl Default for TestClaimBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClaimBuilder {
    /// Creates a new builder with default values
    pub fn new() -> Self {
        let mut claim = Claim::draft(IdFixtures::claimant_id(), MoneyFixtures::usd_250());
        claim.status = ClaimStatus::Extracted;
        claim.category = ClaimCategory::Medical;
        claim.service_date = Some(TemporalFixtures::recent_service_date());
        claim.provider_name = Some(StringFixtures::provider_name().to_string());
        claim.provider_npi = Some(StringFixtures::valid_npi().to_string());
        claim.diagnosis_codes = vec!["J06.9".to_string()];
        claim.procedure_codes = vec!["99213".to_string()];
        claim.ocr_quality_score = Some(0.9);
        claim.extraction_confidence = Some(0.9);
        claim.duplicate_score = 0.1;
        claim.fraud_risk_score = 0.05;
        Self { claim }
    }

    /// Starts from a bare draft with no extracted data
    pub fn draft() -> Self {
        Self {
            claim: Claim::draft(IdFixtures::claimant_id(), MoneyFixtures::usd_zero()),
        }
    }

    pub fn with_claimant(mut self, claimant_id: UserId) -> Self {
        self.claim.claimant_id = claimant_id;
        self
    }

    pub fn with_plan(mut self, plan_id: PlanId) -> Self {
        self.claim.plan_id = Some(plan_id);
        self
    }

    pub fn with_status(mut self, status: ClaimStatus) -> Self {
        self.claim.status = status;
        self
    }

    pub fn with_category(mut self, category: ClaimCategory) -> Self {
        self.claim.category = category;
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.claim.total_amount = amount;
        self
    }

    pub fn with_service_date(mut self, date: NaiveDate) -> Self {
        self.claim.service_date = Some(date);
        self
    }

    pub fn without_service_date(mut self) -> Self {
        self.claim.service_date = None;
        self
    }

    pub fn with_provider(mut self, name: impl Into<String>) -> Self {
        self.claim.provider_name = Some(name.into());
        self
    }

    pub fn with_npi(mut self, npi: impl Into<String>) -> Self {
        self.claim.provider_npi = Some(npi.into());
        self
    }

    pub fn with_provider_type(mut self, provider_type: impl Into<String>) -> Self {
        self.claim.provider_type = Some(provider_type.into());
        self
    }

    pub fn with_procedure_codes(mut self, codes: &[&str]) -> Self {
        self.claim.procedure_codes = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_ocr_quality(mut self, score: f64) -> Self {
        self.claim.ocr_quality_score = Some(score);
        self
    }

    pub fn with_confidence(mut self, score: f64) -> Self {
        self.claim.extraction_confidence = Some(score);
        self
    }

    pub fn with_duplicate_score(mut self, score: f64) -> Self {
        self.claim.duplicate_score = score;
        self
    }

    pub fn with_fraud_risk(mut self, score: f64) -> Self {
        self.claim.fraud_risk_score = score;
        self
    }

    /// Builds the claim
    pub fn build(self) -> Claim {
        self.claim
    }
}

/// Builder for plans
///
/// The default plan allows auto-approval up to $500 with the standard
/// thresholds.
pub struct TestPlanBuilder {
    plan: Plan,
}

impl Default for TestPlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPlanBuilder {
    pub fn new() -> Self {
        let mut plan = Plan::new("Standard Health", Currency::USD);
        plan.auto_approve_enabled = true;
        plan.auto_approve_amount_cap = MoneyFixtures::usd_500();
        Self { plan }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.plan.name = name.into();
        self
    }

    pub fn with_cap(mut self, cap: Money) -> Self {
        self.plan.auto_approve_amount_cap = cap;
        self
    }

    pub fn auto_approve(mut self, enabled: bool) -> Self {
        self.plan.auto_approve_enabled = enabled;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.plan.is_active = false;
        self
    }

    pub fn with_required_documents(mut self, types: &[&str]) -> Self {
        self.plan.required_documents = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_duplicate_match_threshold(mut self, threshold: f64) -> Self {
        self.plan.duplicate_match_threshold = threshold;
        self
    }

    pub fn with_max_duplicate_score(mut self, score: f64) -> Self {
        self.plan.max_duplicate_score = score;
        self
    }

    pub fn build(self) -> Plan {
        self.plan
    }
}

/// Builder for validation rules
pub struct RuleBuilder {
    rule: ValidationRule,
}

impl RuleBuilder {
    /// A global, active, error-severity rule of the given type
    pub fn new(rule_type: &str) -> Self {
        Self {
            rule: ValidationRule::new(rule_type.replace('_', " "), rule_type, json!({})),
        }
    }

    pub fn amount_limit(max_amount: &str) -> Self {
        Self::new("amount_limit").with_condition(json!({ "max_amount": max_amount }))
    }

    pub fn required_fields(fields: &[&str]) -> Self {
        Self::new("required_fields").with_condition(json!({ "fields": fields }))
    }

    pub fn provider_validation() -> Self {
        Self::new("provider_validation")
    }

    pub fn date_range() -> Self {
        Self::new("date_range")
    }

    pub fn eligibility() -> Self {
        Self::new("eligibility")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.rule.name = name.into();
        self
    }

    pub fn with_condition(mut self, condition: Value) -> Self {
        self.rule.condition = condition;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.rule.severity = severity;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.rule.order = order;
        self
    }

    pub fn for_plan(mut self, plan_id: PlanId) -> Self {
        self.rule.plan_id = Some(plan_id);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.rule.is_active = false;
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.rule.error_message = Some(message.into());
        self
    }

    pub fn build(self) -> ValidationRule {
        self.rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_claim_builder_defaults() {
        let claim = TestClaimBuilder::new().build();
        assert_eq!(claim.status, ClaimStatus::Extracted);
        assert_eq!(claim.total_amount.amount(), dec!(250));
        assert!(claim.has_field("service_date"));
    }

    #[test]
    fn test_plan_builder_defaults() {
        let plan = TestPlanBuilder::new().build();
        assert!(plan.auto_approve_enabled);
        assert_eq!(plan.auto_approve_amount_cap.amount(), dec!(500));
    }

    #[test]
    fn test_rule_builder_scoping() {
        let plan_id = PlanId::new();
        let rule = RuleBuilder::amount_limit("1000").for_plan(plan_id).build();
        assert_eq!(rule.rule_type, "amount_limit");
        assert!(rule.applies_to(Some(plan_id)));
        assert!(!rule.applies_to(None));
    }
}
