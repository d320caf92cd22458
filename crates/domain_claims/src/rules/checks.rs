//! One check per rule type
//!
//! Checks are pure: they read the claim and the reference data carried by the
//! [`ValidationContext`] and report an outcome. A check returns `Err` only when
//! it could not be evaluated at all.

use chrono::NaiveDate;
use serde_json::{json, Value};

use core_kernel::Money;

use crate::claim::Claim;
use crate::plan::MemberPolicy;
use crate::document::{missing_types, uploaded_types};
use crate::rules::engine::{PolicyLookup, ValidationContext};
use crate::rules::{
    AmountLimit, CategoryRules, DateRange, Eligibility, ProviderValidation,
    RequiredDocuments, RequiredFields, RuleError, RuleKind,
};

/// What a single check decided
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: Option<String>,
    pub details: Value,
}

impl CheckOutcome {
    fn pass(details: Value) -> Self {
        Self {
            passed: true,
            message: None,
            details,
        }
    }

    fn fail(message: impl Into<String>, details: Value) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
            details,
        }
    }
}

/// Runs the check for a compiled rule
pub fn run(
    kind: &RuleKind,
    ctx: &ValidationContext<'_>,
    default_duplicate_threshold: f64,
) -> Result<CheckOutcome, RuleError> {
    match kind {
        RuleKind::AmountLimit(cond) => Ok(amount_limit(ctx.claim, cond)),
        RuleKind::DateRange(cond) => Ok(date_range(ctx, cond)),
        RuleKind::RequiredFields(cond) => Ok(required_fields(ctx.claim, cond)),
        RuleKind::RequiredDocuments(cond) => Ok(required_documents(ctx, cond)),
        RuleKind::Eligibility(cond) => eligibility(ctx, cond),
        RuleKind::DuplicateCheck(cond) => {
            let threshold = cond
                .similarity_threshold
                .or_else(|| ctx.plan.map(|plan| plan.max_duplicate_score))
                .unwrap_or(default_duplicate_threshold);
            Ok(duplicate_check(ctx.claim, threshold))
        }
        RuleKind::ProviderValidation(cond) => Ok(provider_validation(ctx.claim, cond)),
        RuleKind::CategoryRules(cond) => Ok(category_rules(ctx.claim, cond)),
    }
}

fn amount_limit(claim: &Claim, cond: &AmountLimit) -> CheckOutcome {
    let amount = claim.total_amount;
    let currency = claim.currency();

    if amount.amount() < cond.min_amount {
        return CheckOutcome::fail(
            format!(
                "Claim amount {} is below minimum {}",
                amount,
                Money::new(cond.min_amount, currency)
            ),
            json!({ "amount": amount.amount(), "min": cond.min_amount }),
        );
    }

    if let Some(max) = cond.max_amount {
        if amount.amount() > max {
            return CheckOutcome::fail(
                format!(
                    "Claim amount {} exceeds maximum {}",
                    amount,
                    Money::new(max, currency)
                ),
                json!({ "amount": amount.amount(), "max": max }),
            );
        }
    }

    CheckOutcome::pass(json!({ "amount": amount.amount() }))
}

fn date_range(ctx: &ValidationContext<'_>, cond: &DateRange) -> CheckOutcome {
    let Some(service_date) = ctx.claim.service_date else {
        return CheckOutcome::fail("Service date is required", json!({}));
    };

    // bounded by the calendar range, so negating it cannot overflow
    let days_past = (ctx.today - service_date).num_days();
    let days_future = -days_past;

    if days_past > cond.max_days_past {
        return CheckOutcome::fail(
            format!(
                "Service date is {} days ago, maximum is {} days",
                days_past, cond.max_days_past
            ),
            json!({ "days_past": days_past, "max_allowed": cond.max_days_past }),
        );
    }

    if days_future > cond.max_days_future {
        return CheckOutcome::fail(
            format!(
                "Service date is {} days in the future, maximum is {} days",
                days_future, cond.max_days_future
            ),
            json!({ "days_future": days_future, "max_allowed": cond.max_days_future }),
        );
    }

    CheckOutcome::pass(json!({ "service_date": service_date.to_string() }))
}

fn required_fields(claim: &Claim, cond: &RequiredFields) -> CheckOutcome {
    let missing: Vec<&str> = cond
        .fields
        .iter()
        .map(String::as_str)
        .filter(|field| !claim.has_field(field))
        .collect();

    if missing.is_empty() {
        CheckOutcome::pass(json!({ "checked_fields": cond.fields }))
    } else {
        CheckOutcome::fail(
            format!("Missing required fields: {}", missing.join(", ")),
            json!({ "missing_fields": missing }),
        )
    }
}

fn required_documents(ctx: &ValidationContext<'_>, cond: &RequiredDocuments) -> CheckOutcome {
    let uploaded = uploaded_types(ctx.documents);
    let missing = missing_types(&cond.document_types, ctx.documents);

    if missing.is_empty() {
        CheckOutcome::pass(json!({ "uploaded_documents": uploaded }))
    } else {
        CheckOutcome::fail(
            format!("Missing required documents: {}", missing.join(", ")),
            json!({ "missing_documents": missing, "uploaded": uploaded }),
        )
    }
}

fn eligibility(ctx: &ValidationContext<'_>, cond: &Eligibility) -> Result<CheckOutcome, RuleError> {
    let claim = ctx.claim;

    let Some(plan_id) = claim.plan_id else {
        return Ok(if cond.require_active_policy {
            CheckOutcome::fail("No plan associated with claim", json!({}))
        } else {
            CheckOutcome::pass(json!({}))
        });
    };

    let policies: &[MemberPolicy] = match &ctx.policy {
        PolicyLookup::Found(policies) => policies,
        PolicyLookup::Missing => &[],
        PolicyLookup::Failed(reason) => return Err(RuleError::ReferenceData(reason.clone())),
    };
    let Some(first) = policies.first() else {
        return Ok(CheckOutcome::fail(
            "No policy found for this member and plan",
            json!({ "user_id": claim.claimant_id, "plan_id": plan_id }),
        ));
    };

    let service_date = claim.service_date;
    let covering = policies
        .iter()
        .find(|p| p.is_active() && service_date.map_or(true, |date| p.covers(date)));
    if let Some(policy) = covering {
        return Ok(CheckOutcome::pass(json!({
            "policy_id": policy.id,
            "member_number": policy.member_number,
        })));
    }

    // No policy qualifies; explain the failure using the nearest miss
    let policy = nearest_miss(policies, service_date).unwrap_or(first);

    if !policy.is_active() {
        return Ok(CheckOutcome::fail(
            format!("Policy is not active (status: {})", policy.status),
            json!({ "policy_status": policy.status }),
        ));
    }

    if let Some(service_date) = service_date {
        if service_date < policy.start_date {
            return Ok(CheckOutcome::fail(
                "Service date is before policy start date",
                json!({
                    "service_date": service_date.to_string(),
                    "policy_start": policy.start_date.to_string(),
                }),
            ));
        }

        if let Some(end_date) = policy.end_date {
            if service_date > end_date {
                return Ok(CheckOutcome::fail(
                    "Service date is after policy end date",
                    json!({
                        "service_date": service_date.to_string(),
                        "policy_end": end_date.to_string(),
                    }),
                ));
            }
        }
    }

    Ok(CheckOutcome::fail(
        "No active policy covers the service date",
        json!({ "policy_id": policy.id }),
    ))
}

/// An active policy closest in time to the service date, else an inactive
/// one whose period covers it
fn nearest_miss(policies: &[MemberPolicy], service_date: Option<NaiveDate>) -> Option<&MemberPolicy> {
    let date = service_date?;
    policies
        .iter()
        .filter(|p| p.is_active())
        .min_by_key(|p| p.days_outside(date))
        .or_else(|| policies.iter().find(|p| p.covers(date)))
}

fn duplicate_check(claim: &Claim, threshold: f64) -> CheckOutcome {
    if claim.duplicate_score >= threshold {
        return CheckOutcome::fail(
            format!(
                "Potential duplicate detected (similarity: {})",
                percent(claim.duplicate_score)
            ),
            json!({ "duplicate_score": claim.duplicate_score, "threshold": threshold }),
        );
    }

    CheckOutcome::pass(json!({ "duplicate_score": claim.duplicate_score }))
}

fn provider_validation(claim: &Claim, cond: &ProviderValidation) -> CheckOutcome {
    let npi = claim
        .provider_npi
        .as_deref()
        .map(str::trim)
        .filter(|npi| !npi.is_empty());

    match npi {
        None if cond.require_npi => {
            return CheckOutcome::fail("Provider NPI is required", json!({ "require_npi": true }));
        }
        Some(npi) if !is_valid_npi(npi) => {
            return CheckOutcome::fail(
                "Invalid NPI format (must be 10 digits)",
                json!({ "npi": npi }),
            );
        }
        _ => {}
    }

    if !cond.allowed_provider_types.is_empty() {
        let provider_type = claim
            .provider_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        match provider_type {
            None => {
                return CheckOutcome::fail(
                    "Provider type is required",
                    json!({ "allowed_provider_types": cond.allowed_provider_types }),
                );
            }
            Some(kind)
                if !cond
                    .allowed_provider_types
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(kind)) =>
            {
                return CheckOutcome::fail(
                    format!("Provider type {kind} is not allowed"),
                    json!({
                        "provider_type": kind,
                        "allowed_provider_types": cond.allowed_provider_types,
                    }),
                );
            }
            Some(_) => {}
        }
    }

    CheckOutcome::pass(json!({
        "provider_name": claim.provider_name,
        "npi": claim.provider_npi,
    }))
}

fn category_rules(claim: &Claim, cond: &CategoryRules) -> CheckOutcome {
    if claim.category != cond.category {
        return CheckOutcome::pass(json!({ "skipped": "Category mismatch" }));
    }

    if let Some(max) = cond.max_amount {
        if claim.total_amount.amount() > max {
            return CheckOutcome::fail(
                format!(
                    "Amount exceeds {} category limit of {}",
                    cond.category,
                    Money::new(max, claim.currency())
                ),
                json!({ "amount": claim.total_amount.amount(), "category_limit": max }),
            );
        }
    }

    if !cond.required_codes.is_empty() {
        let provided: Vec<&str> = claim.all_codes().collect();
        let satisfied = cond
            .required_codes
            .iter()
            .any(|code| provided.contains(&code.as_str()));

        if !satisfied {
            return CheckOutcome::fail(
                format!(
                    "Missing required codes for {}: {}",
                    cond.category,
                    cond.required_codes.join(", ")
                ),
                json!({ "required": cond.required_codes, "provided": provided }),
            );
        }
    }

    CheckOutcome::pass(json!({ "category": cond.category }))
}

fn is_valid_npi(npi: &str) -> bool {
    npi.len() == 10 && npi.bytes().all(|b| b.is_ascii_digit())
}

/// Formats a 0..=1 score as a whole percentage
pub(crate) fn percent(score: f64) -> String {
    format!("{:.0}%", score * 100.0)
}
