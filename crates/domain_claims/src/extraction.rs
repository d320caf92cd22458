//! Extracted field values and the extractor handle
//!
//! OCR and field extraction run outside the core. The core receives their
//! output as an [`Extraction`] and applies it to the claim, filling only the
//! attributes that are still unset.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use core_kernel::{Currency, Money};

use crate::claim::{Claim, ClaimCategory};
use crate::document::DocumentUpload;

/// Field values read off a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub total_amount: Option<String>,
    pub currency: Option<String>,
    pub service_date: Option<String>,
    pub provider_name: Option<String>,
    pub provider_npi: Option<String>,
    pub claim_type: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub diagnosis_codes: Vec<String>,
    #[serde(default)]
    pub procedure_codes: Vec<String>,
}

/// Output of extraction for one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub ocr_text: Option<String>,
    pub ocr_quality_score: Option<f64>,
    pub fields: ExtractedFields,
    /// Overall confidence in the extracted fields, 0..=1
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extractor unavailable: {0}")]
    Unavailable(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Reads fields off an uploaded document
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, upload: &DocumentUpload) -> Result<Extraction, ExtractionError>;
}

type ExtractorFactory =
    Arc<dyn Fn() -> Result<Arc<dyn DocumentExtractor>, ExtractionError> + Send + Sync>;

/// Lazily built, shareable extractor handle
///
/// The factory runs on first use only; concurrent first callers wait for the
/// same initialisation. Clones share the underlying extractor.
#[derive(Clone)]
pub struct SharedExtractor {
    cell: Arc<OnceCell<Arc<dyn DocumentExtractor>>>,
    factory: ExtractorFactory,
}

impl fmt::Debug for SharedExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedExtractor")
            .field("initialized", &self.cell.initialized())
            .finish()
    }
}

impl SharedExtractor {
    /// Wraps a factory that builds the extractor on first use
    pub fn lazy<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn DocumentExtractor>, ExtractionError> + Send + Sync + 'static,
    {
        Self {
            cell: Arc::new(OnceCell::new()),
            factory: Arc::new(factory),
        }
    }

    /// Wraps an already-built extractor
    pub fn ready(extractor: Arc<dyn DocumentExtractor>) -> Self {
        let cell = OnceCell::new_with(Some(extractor.clone()));
        Self {
            cell: Arc::new(cell),
            factory: Arc::new(move || Ok(extractor.clone())),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Returns the extractor, building it if needed
    pub async fn get(&self) -> Result<Arc<dyn DocumentExtractor>, ExtractionError> {
        let extractor = self
            .cell
            .get_or_try_init(|| async {
                info!("Initializing document extractor");
                (self.factory)()
            })
            .await?;
        Ok(extractor.clone())
    }

    pub async fn extract(&self, upload: &DocumentUpload) -> Result<Extraction, ExtractionError> {
        self.get().await?.extract(upload).await
    }
}

/// Applies extracted values to the claim's unset attributes
///
/// Returns the names of the attributes that were filled.
pub fn apply_extraction(claim: &mut Claim, extraction: &Extraction) -> Vec<&'static str> {
    let fields = &extraction.fields;
    let mut filled = Vec::new();

    if claim.total_amount.is_zero() {
        if let Some(raw) = fields.total_amount.as_deref() {
            let currency = fields
                .currency
                .as_deref()
                .and_then(|code| code.parse::<Currency>().ok())
                .unwrap_or_else(|| claim.currency());
            if let Ok(amount) = Money::parse(raw, currency) {
                if amount.is_positive() {
                    claim.total_amount = amount;
                    filled.push("total_amount");
                }
            }
        }
    }

    if claim.service_date.is_none() {
        if let Some(date) = fields.service_date.as_deref().and_then(parse_date) {
            claim.service_date = Some(date);
            filled.push("service_date");
        }
    }

    fill_text(&mut claim.provider_name, &fields.provider_name, "provider_name", &mut filled);
    fill_text(&mut claim.provider_npi, &fields.provider_npi, "provider_npi", &mut filled);
    fill_text(&mut claim.description, &fields.description, "description", &mut filled);

    if claim.diagnosis_codes.is_empty() && !fields.diagnosis_codes.is_empty() {
        claim.diagnosis_codes = fields.diagnosis_codes.clone();
        filled.push("diagnosis_codes");
    }
    if claim.procedure_codes.is_empty() && !fields.procedure_codes.is_empty() {
        claim.procedure_codes = fields.procedure_codes.clone();
        filled.push("procedure_codes");
    }

    if claim.category == ClaimCategory::Other {
        if let Some(detected) = fields.claim_type.as_deref() {
            claim.category = ClaimCategory::from_detected_type(detected);
        }
        if claim.category == ClaimCategory::Other {
            if let Some(guess) = extraction.ocr_text.as_deref().and_then(ClaimCategory::from_keywords) {
                claim.category = guess;
            }
        }
        if claim.category != ClaimCategory::Other {
            filled.push("category");
        }
    }

    claim.extraction_confidence = Some(extraction.confidence);

    debug!(claim_id = %claim.id, ?filled, "Applied extracted fields");
    filled
}

fn fill_text(
    target: &mut Option<String>,
    value: &Option<String>,
    name: &'static str,
    filled: &mut Vec<&'static str>,
) {
    let unset = target.as_deref().map_or(true, |v| v.trim().is_empty());
    if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        if unset {
            *target = Some(value.to_string());
            filled.push(name);
        }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok())
}
