//! Validation rules
//!
//! Rules are stored loosely (a `rule_type` string plus a JSON condition) and
//! compiled into [`RuleKind`] before evaluation, so each check works against a
//! typed condition and dispatch is an exhaustive `match`.

pub mod checks;
pub mod engine;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use core_kernel::{ClaimId, PlanId, RuleId};

use crate::claim::ClaimCategory;
use crate::error::ClaimError;

pub use engine::{summarize, PolicyLookup, RuleEngine, RuleSet, ValidationContext};

/// Severity of a failed rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks auto-approval
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(ClaimError::InvalidInput(format!("unknown severity: {other}"))),
        }
    }
}

/// A configured validation rule as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub id: RuleId,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub condition: Value,
    pub severity: Severity,
    pub order: i32,
    /// `None` makes the rule global
    pub plan_id: Option<PlanId>,
    pub is_active: bool,
    /// Message used when a failing check produced none of its own
    pub error_message: Option<String>,
}

impl ValidationRule {
    /// Creates an active, global, error-severity rule
    pub fn new(name: impl Into<String>, rule_type: impl Into<String>, condition: Value) -> Self {
        Self {
            id: RuleId::new_v7(),
            name: name.into(),
            description: None,
            rule_type: rule_type.into(),
            condition,
            severity: Severity::Error,
            order: 0,
            plan_id: None,
            is_active: true,
            error_message: None,
        }
    }

    /// True for global rules and rules scoped to the given plan
    pub fn applies_to(&self, plan_id: Option<PlanId>) -> bool {
        match self.plan_id {
            None => true,
            Some(scoped) => plan_id == Some(scoped),
        }
    }
}

/// Errors raised while compiling a stored rule
#[derive(Debug, Error)]
pub enum RuleConfigError {
    #[error("Unknown rule type: {0}")]
    UnknownRuleType(String),

    #[error("Malformed condition for {rule_type}: {source}")]
    MalformedCondition {
        rule_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid condition for {rule_type}: {reason}")]
    InvalidCondition {
        rule_type: &'static str,
        reason: String,
    },
}

/// Errors raised while a check runs against a claim
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("reference data unavailable: {0}")]
    ReferenceData(String),

    #[error(transparent)]
    Money(#[from] core_kernel::MoneyError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AmountLimit {
    pub max_amount: Option<Decimal>,
    #[serde(default)]
    pub min_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DateRange {
    #[serde(default = "default_max_days_past")]
    pub max_days_past: i64,
    #[serde(default)]
    pub max_days_future: i64,
}

fn default_max_days_past() -> i64 {
    365
}

impl DateRange {
    /// Windows are day counts and cannot be negative
    fn checked(self) -> Result<Self, RuleConfigError> {
        if self.max_days_past < 0 || self.max_days_future < 0 {
            return Err(RuleConfigError::InvalidCondition {
                rule_type: "date_range",
                reason: format!(
                    "day windows must not be negative (past {}, future {})",
                    self.max_days_past, self.max_days_future
                ),
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequiredFields {
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequiredDocuments {
    #[serde(default)]
    pub document_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Eligibility {
    #[serde(default = "default_true")]
    pub require_active_policy: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DuplicateCheck {
    /// Falls back to the plan's `max_duplicate_score`, then the engine default
    pub similarity_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderValidation {
    #[serde(default)]
    pub require_npi: bool,
    #[serde(default)]
    pub allowed_provider_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryRules {
    pub category: ClaimCategory,
    pub max_amount: Option<Decimal>,
    #[serde(default)]
    pub required_codes: Vec<String>,
}

/// A compiled rule: the closed set of checks with their typed conditions
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    AmountLimit(AmountLimit),
    DateRange(DateRange),
    RequiredFields(RequiredFields),
    RequiredDocuments(RequiredDocuments),
    Eligibility(Eligibility),
    DuplicateCheck(DuplicateCheck),
    ProviderValidation(ProviderValidation),
    CategoryRules(CategoryRules),
}

impl RuleKind {
    /// Parses a stored `rule_type` and its condition
    ///
    /// A null condition is read as an empty object so every default applies.
    pub fn parse(rule_type: &str, condition: &Value) -> Result<Self, RuleConfigError> {
        let kind = match rule_type {
            "amount_limit" => RuleKind::AmountLimit(condition_as("amount_limit", condition)?),
            "date_range" => {
                RuleKind::DateRange(condition_as::<DateRange>("date_range", condition)?.checked()?)
            }
            "required_fields" => {
                RuleKind::RequiredFields(condition_as("required_fields", condition)?)
            }
            "required_documents" => {
                RuleKind::RequiredDocuments(condition_as("required_documents", condition)?)
            }
            "eligibility" => RuleKind::Eligibility(condition_as("eligibility", condition)?),
            "duplicate_check" => {
                RuleKind::DuplicateCheck(condition_as("duplicate_check", condition)?)
            }
            "provider_validation" => {
                RuleKind::ProviderValidation(condition_as("provider_validation", condition)?)
            }
            "category_rules" => RuleKind::CategoryRules(condition_as("category_rules", condition)?),
            other => return Err(RuleConfigError::UnknownRuleType(other.to_string())),
        };
        Ok(kind)
    }

    pub fn rule_type(&self) -> &'static str {
        match self {
            RuleKind::AmountLimit(_) => "amount_limit",
            RuleKind::DateRange(_) => "date_range",
            RuleKind::RequiredFields(_) => "required_fields",
            RuleKind::RequiredDocuments(_) => "required_documents",
            RuleKind::Eligibility(_) => "eligibility",
            RuleKind::DuplicateCheck(_) => "duplicate_check",
            RuleKind::ProviderValidation(_) => "provider_validation",
            RuleKind::CategoryRules(_) => "category_rules",
        }
    }
}

fn condition_as<T: DeserializeOwned>(
    rule_type: &'static str,
    condition: &Value,
) -> Result<T, RuleConfigError> {
    let value = match condition {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value)
        .map_err(|source| RuleConfigError::MalformedCondition { rule_type, source })
}

/// Outcome of one rule against one claim
///
/// A validation pass produces a fresh set that replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub claim_id: ClaimId,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub passed: bool,
    pub severity: Severity,
    pub message: Option<String>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl ValidationResult {
    /// A failure at error severity
    pub fn is_blocking(&self) -> bool {
        !self.passed && self.severity == Severity::Error
    }
}

/// Aggregate view of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_rules: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    /// No error-severity failures
    pub is_valid: bool,
    pub error_messages: Vec<String>,
    pub warning_messages: Vec<String>,
}
