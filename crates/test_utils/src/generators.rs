//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating claims pipeline data that
//! maintains domain invariants.

use chrono::{Days, NaiveDate};
use core_kernel::{Currency, Money, UserId};
use proptest::prelude::*;
use proptest::sample::select;
use rust_decimal::Decimal;

use domain_claims::claim::{Claim, ClaimCategory, ClaimStatus};

/// Strategy for generating Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::CAD),
        Just(Currency::JPY),
    ]
}

/// Strategy for generating valid positive amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..10_000_000i64
}

/// Strategy for generating positive USD Money values
pub fn usd_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_minor_strategy().prop_map(|amount| Money::from_minor(amount, Currency::USD))
}

/// Strategy for generating positive Decimal values
pub fn positive_decimal_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000i64, 0u32..4u32).prop_map(|(m, s)| Decimal::new(m, s))
}

/// Strategy for generating scores in 0..=1
pub fn score_strategy() -> impl Strategy<Value = f64> {
    (0u32..=100u32).prop_map(|n| f64::from(n) / 100.0)
}

pub fn claim_status_strategy() -> impl Strategy<Value = ClaimStatus> {
    select(ClaimStatus::ALL.to_vec())
}

pub fn claim_category_strategy() -> impl Strategy<Value = ClaimCategory> {
    select(ClaimCategory::ALL.to_vec())
}

/// Strategy for service dates within the last year
pub fn service_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0u64..365u64).prop_map(|days| {
        let today = chrono::Utc::now().date_naive();
        today - Days::new(days)
    })
}

/// Strategy for a submitted claim of `claimant_id` with arbitrary comparable
/// attributes
pub fn comparable_claim_strategy(claimant_id: UserId) -> impl Strategy<Value = Claim> {
    (
        usd_money_strategy(),
        proptest::option::of(service_date_strategy()),
        proptest::option::of(select(vec!["Riverside Clinic", "riverside clinic", "Harbor Dental"])),
        claim_category_strategy(),
        proptest::collection::vec(select(vec!["99213", "99214", "D0120", "J1100"]), 0..3),
    )
        .prop_map(move |(amount, service_date, provider, category, codes)| {
            let mut claim = Claim::draft(claimant_id, amount);
            claim.status = ClaimStatus::Submitted;
            claim.service_date = service_date;
            claim.provider_name = provider.map(str::to_string);
            claim.category = category;
            claim.procedure_codes = codes.into_iter().map(str::to_string).collect();
            claim
        })
}
