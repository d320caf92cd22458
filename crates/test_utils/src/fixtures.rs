//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for the claims pipeline. Dates are
//! relative to today so that `date_range` rules keep passing as time moves on.

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use core_kernel::{Currency, Money, UserId};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use domain_claims::document::DocumentUpload;
use domain_claims::extraction::{
    DocumentExtractor, ExtractedFields, Extraction, ExtractionError, SharedExtractor,
};

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn usd_100() -> Money {
        Money::new(dec!(100.00), Currency::USD)
    }

    pub fn usd_102() -> Money {
        Money::new(dec!(102.00), Currency::USD)
    }

    /// Amount under the standard auto-approve cap
    pub fn usd_250() -> Money {
        Money::new(dec!(250.00), Currency::USD)
    }

    /// The standard auto-approve cap
    pub fn usd_500() -> Money {
        Money::new(dec!(500.00), Currency::USD)
    }

    /// Amount over the standard auto-approve cap
    pub fn usd_750() -> Money {
        Money::new(dec!(750.00), Currency::USD)
    }

    pub fn usd_zero() -> Money {
        Money::zero(Currency::USD)
    }

    /// Creates a EUR amount for currency mismatch tests
    pub fn eur_100() -> Money {
        Money::new(dec!(100.00), Currency::EUR)
    }
}

/// Fixture for dates
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// A service date well inside the usual one-year window
    pub fn recent_service_date() -> NaiveDate {
        Self::days_ago(5)
    }

    pub fn days_ago(days: u64) -> NaiveDate {
        Utc::now().date_naive() - Days::new(days)
    }

    /// Policy start a year back
    pub fn policy_start() -> NaiveDate {
        Self::days_ago(365)
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    /// A deterministic claimant ID
    pub fn claimant_id() -> UserId {
        UserId::from_uuid(Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440001))
    }

    /// A deterministic agent ID
    pub fn agent_id() -> UserId {
        UserId::from_uuid(Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440002))
    }
}

/// Fixture for string data
pub struct StringFixtures;

impl StringFixtures {
    pub fn provider_name() -> &'static str {
        "Riverside Family Clinic"
    }

    /// A well-formed 10-digit NPI
    pub fn valid_npi() -> &'static str {
        "1234567893"
    }

    /// Too short to be an NPI
    pub fn short_npi() -> &'static str {
        "12345"
    }

    pub fn member_number() -> &'static str {
        "MBR-000123"
    }
}

/// Fixture for uploaded documents
pub struct DocumentFixtures;

impl DocumentFixtures {
    /// An itemised bill scan
    pub fn bill() -> DocumentUpload {
        Self::bill_with_bytes(b"%PDF-1.7 itemised bill".to_vec())
    }

    pub fn bill_with_bytes(bytes: Vec<u8>) -> DocumentUpload {
        DocumentUpload::new("bill.pdf", "application/pdf", bytes).with_document_type("bill")
    }

    /// A plain-text note, never sent to extraction
    pub fn note() -> DocumentUpload {
        DocumentUpload::new("note.txt", "text/plain", b"call me back".to_vec())
    }
}

/// Fixture for extraction output
pub struct ExtractionFixtures;

impl ExtractionFixtures {
    /// A clean read of a medical bill
    pub fn medical_bill(amount: &str) -> Extraction {
        Extraction {
            ocr_text: Some("Office visit, patient examination".to_string()),
            ocr_quality_score: Some(0.9),
            fields: ExtractedFields {
                total_amount: Some(amount.to_string()),
                currency: Some("USD".to_string()),
                service_date: Some(TemporalFixtures::recent_service_date().to_string()),
                provider_name: Some(StringFixtures::provider_name().to_string()),
                provider_npi: Some(StringFixtures::valid_npi().to_string()),
                claim_type: Some("doctor".to_string()),
                description: Some("Office visit".to_string()),
                diagnosis_codes: vec!["J06.9".to_string()],
                procedure_codes: vec!["99213".to_string()],
            },
            confidence: 0.9,
        }
    }
}

/// Extractor that returns the same output for every upload
#[derive(Debug)]
pub struct FixedExtractor {
    output: Result<Extraction, String>,
    calls: AtomicUsize,
}

impl FixedExtractor {
    pub fn returning(extraction: Extraction) -> Arc<Self> {
        Arc::new(Self {
            output: Ok(extraction),
            calls: AtomicUsize::new(0),
        })
    }

    /// An extractor whose every call fails
    pub fn failing(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            output: Err(message.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wraps this extractor in a ready shared handle
    pub fn shared(self: &Arc<Self>) -> SharedExtractor {
        SharedExtractor::ready(self.clone())
    }
}

#[async_trait]
impl DocumentExtractor for FixedExtractor {
    async fn extract(&self, _upload: &DocumentUpload) -> Result<Extraction, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output.clone().map_err(ExtractionError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_service_date_is_in_the_past() {
        assert!(TemporalFixtures::recent_service_date() < Utc::now().date_naive());
    }

    #[test]
    fn test_fixture_ids_are_stable() {
        assert_eq!(IdFixtures::claimant_id(), IdFixtures::claimant_id());
        assert_ne!(IdFixtures::claimant_id(), IdFixtures::agent_id());
    }

    #[tokio::test]
    async fn test_fixed_extractor_counts_calls() {
        let extractor = FixedExtractor::returning(ExtractionFixtures::medical_bill("250.00"));
        let shared = extractor.shared();
        shared.extract(&DocumentFixtures::bill()).await.unwrap();
        assert_eq!(extractor.calls(), 1);
    }
}
