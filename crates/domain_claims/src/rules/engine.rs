//! Rule engine
//!
//! `validate` is a pure function of the claim, the compiled rule set and the
//! reference data in the context. Persisting the results is the caller's job.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, warn};

use core_kernel::PlanId;

use crate::claim::Claim;
use crate::config::EngineConfig;
use crate::document::ClaimDocument;
use crate::plan::{MemberPolicy, Plan};
use crate::rules::checks;
use crate::rules::{RuleKind, Severity, ValidationResult, ValidationRule, ValidationSummary};

/// Outcome of looking up the claimant's policies on the claim's plan
#[derive(Debug, Clone)]
pub enum PolicyLookup<'a> {
    /// Every policy the claimant holds on the plan, renewals included
    Found(&'a [MemberPolicy]),
    Missing,
    /// The lookup itself failed; the eligibility rule reports it
    Failed(String),
}

/// Everything a rule may look at
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    pub claim: &'a Claim,
    pub documents: &'a [ClaimDocument],
    pub plan: Option<&'a Plan>,
    pub policy: PolicyLookup<'a>,
    /// Reference date for `date_range`
    pub today: NaiveDate,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: ValidationRule,
    kind: Result<RuleKind, String>,
}

/// Applicable rules for one claim, in evaluation order
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Keeps active global rules plus active rules of `plan_id`, ordered by
    /// `order` with ties left in storage order, and parses each condition.
    ///
    /// Rules that fail to parse stay in the set and evaluate to a failure.
    pub fn compile(rules: impl IntoIterator<Item = ValidationRule>, plan_id: Option<PlanId>) -> Self {
        let mut applicable: Vec<ValidationRule> = rules
            .into_iter()
            .filter(|rule| rule.is_active && rule.applies_to(plan_id))
            .collect();
        applicable.sort_by_key(|rule| rule.order);

        let rules = applicable
            .into_iter()
            .map(|rule| {
                let kind = RuleKind::parse(&rule.rule_type, &rule.condition).map_err(|err| {
                    warn!(
                        rule_id = %rule.id,
                        rule_name = %rule.name,
                        error = %err,
                        "Invalid validation rule configuration"
                    );
                    err.to_string()
                });
                CompiledRule { rule, kind }
            })
            .collect();

        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule names in evaluation order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|compiled| compiled.rule.name.as_str())
    }
}

/// Evaluates rule sets against claims
#[derive(Debug, Clone)]
pub struct RuleEngine {
    default_duplicate_threshold: f64,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl RuleEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            default_duplicate_threshold: config.duplicate_rule_threshold,
        }
    }

    /// Runs every rule of the set and returns one result per rule
    ///
    /// A broken or failing rule yields a failed result and never stops the
    /// remaining rules from running.
    pub fn validate(&self, ctx: &ValidationContext<'_>, rules: &RuleSet) -> Vec<ValidationResult> {
        rules
            .rules
            .iter()
            .map(|compiled| self.evaluate(ctx, compiled))
            .collect()
    }

    fn evaluate(&self, ctx: &ValidationContext<'_>, compiled: &CompiledRule) -> ValidationResult {
        let rule = &compiled.rule;

        let (passed, message, details) = match &compiled.kind {
            Err(config_error) => (
                false,
                Some(config_error.clone()),
                json!({ "rule_type": rule.rule_type, "configuration_error": config_error }),
            ),
            Ok(kind) => match checks::run(kind, ctx, self.default_duplicate_threshold) {
                Ok(outcome) => (outcome.passed, outcome.message, outcome.details),
                Err(err) => (
                    false,
                    Some(format!("Rule evaluation error: {err}")),
                    json!({ "error": err.to_string() }),
                ),
            },
        };

        let message = if passed {
            message
        } else {
            message.or_else(|| rule.error_message.clone())
        };

        debug!(
            claim_id = %ctx.claim.id,
            rule = %rule.name,
            passed,
            "Rule evaluated"
        );

        ValidationResult {
            claim_id: ctx.claim.id,
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            passed,
            severity: rule.severity,
            message,
            details,
            created_at: Utc::now(),
        }
    }
}

/// Counts and messages for a validation pass
pub fn summarize(results: &[ValidationResult]) -> ValidationSummary {
    let failed: Vec<&ValidationResult> = results.iter().filter(|r| !r.passed).collect();

    let messages = |severity: Severity| -> Vec<String> {
        failed
            .iter()
            .filter(|r| r.severity == severity)
            .map(|r| r.message.clone().unwrap_or_else(|| r.rule_name.clone()))
            .collect()
    };

    let error_messages = messages(Severity::Error);
    let warning_messages = messages(Severity::Warning);

    ValidationSummary {
        total_rules: results.len(),
        passed: results.len() - failed.len(),
        failed: failed.len(),
        errors: error_messages.len(),
        warnings: warning_messages.len(),
        is_valid: error_messages.is_empty(),
        error_messages,
        warning_messages,
    }
}
