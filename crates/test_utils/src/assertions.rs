//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for claims pipeline types that give
//! more meaningful error messages than standard assertions.

use core_kernel::Money;
use rust_decimal::Decimal;

use domain_claims::audit::{AuditAction, AuditEntry};
use domain_claims::claim::{Claim, ClaimStatus};
use domain_claims::duplicates::DuplicateMatch;
use domain_claims::rules::ValidationResult;

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Panics
///
/// Panics if the currencies don't match or the amounts differ by more than tolerance
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual,
        expected,
        diff,
        tolerance
    );
}

/// Asserts the claim's status
pub fn assert_status(claim: &Claim, expected: ClaimStatus) {
    assert_eq!(
        claim.status, expected,
        "Claim {} is {}, expected {}",
        claim.claim_number, claim.status, expected
    );
}

/// Asserts that the named rule ran and failed with the given message
///
/// Returns the matching result for further checks.
pub fn assert_rule_failed<'a>(
    results: &'a [ValidationResult],
    rule_name: &str,
    message: &str,
) -> &'a ValidationResult {
    let result = results
        .iter()
        .find(|r| r.rule_name == rule_name)
        .unwrap_or_else(|| panic!("No result for rule {rule_name:?}"));
    assert!(!result.passed, "Rule {rule_name:?} passed, expected a failure");
    assert_eq!(
        result.message.as_deref(),
        Some(message),
        "Rule {rule_name:?} failed with an unexpected message"
    );
    result
}

/// Asserts that every result passed
pub fn assert_all_rules_passed(results: &[ValidationResult]) {
    let failed: Vec<String> = results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| format!("{}: {}", r.rule_name, r.message.as_deref().unwrap_or("-")))
        .collect();
    assert!(failed.is_empty(), "Rules failed: {failed:?}");
}

/// Asserts that the claim's duplicate score is the highest similarity among
/// its matches, or zero without matches
pub fn assert_duplicate_score_consistent(claim: &Claim, matches: &[DuplicateMatch]) {
    let expected = matches
        .iter()
        .filter(|m| m.claim_id == claim.id)
        .map(|m| m.similarity_score)
        .fold(0.0, f64::max);
    assert!(
        (claim.duplicate_score - expected).abs() < 1e-9,
        "duplicate_score {} does not match highest match score {}",
        claim.duplicate_score,
        expected
    );
}

/// Asserts the sequence of audit actions
pub fn assert_audit_actions(entries: &[AuditEntry], expected: &[AuditAction]) {
    let actual: Vec<AuditAction> = entries.iter().map(|e| e.action).collect();
    assert_eq!(actual, expected, "Unexpected audit trail");
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_approx_eq_within_tolerance() {
        let a = Money::new(dec!(100.001), Currency::USD);
        let b = Money::new(dec!(100.00), Currency::USD);
        assert_money_approx_eq(&a, &b, dec!(0.01));
    }

    #[test]
    #[should_panic(expected = "Currency mismatch")]
    fn test_money_approx_eq_currency_mismatch() {
        let a = Money::new(dec!(100), Currency::USD);
        let b = Money::new(dec!(100), Currency::EUR);
        assert_money_approx_eq(&a, &b, dec!(0.01));
    }

    #[test]
    fn test_duplicate_score_without_matches() {
        let claim = crate::builders::TestClaimBuilder::new()
            .with_duplicate_score(0.0)
            .build();
        assert_duplicate_score_consistent(&claim, &[]);
    }
}
