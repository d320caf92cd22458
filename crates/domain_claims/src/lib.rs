//! Claims Decision Domain
//!
//! This crate decides insurance claims: it validates a claim against typed
//! rules, scores it for duplicates, decides whether it may be approved without
//! human review and moves it through a fixed status graph with an audit trail.
//!
//! # Claim Lifecycle
//!
//! ```text
//! DRAFT -> SUBMITTED -> EXTRACTED -> VALIDATED -> AUTO_APPROVED -> CLOSED
//!                                        \
//!                                         -> PENDING_REVIEW -> APPROVED/DENIED/PENDED
//! ```
//!
//! # Examples
//!
//! ```rust
//! use domain_claims::rules::{summarize, PolicyLookup, RuleEngine, RuleSet, ValidationContext, ValidationRule};
//! use domain_claims::Claim;
//! use core_kernel::{Currency, Money, UserId};
//! use rust_decimal_macros::dec;
//! use serde_json::json;
//!
//! let mut claim = Claim::draft(UserId::new(), Money::new(dec!(250), Currency::USD));
//! claim.provider_npi = Some("12345".to_string());
//!
//! let rules = RuleSet::compile(
//!     vec![ValidationRule::new("NPI format", "provider_validation", json!({}))],
//!     None,
//! );
//! let ctx = ValidationContext {
//!     claim: &claim,
//!     documents: &[],
//!     plan: None,
//!     policy: PolicyLookup::Missing,
//!     today: chrono::Utc::now().date_naive(),
//! };
//!
//! let results = RuleEngine::default().validate(&ctx, &rules);
//! assert_eq!(results[0].message.as_deref(), Some("Invalid NPI format (must be 10 digits)"));
//! assert!(!summarize(&results).is_valid);
//! ```

pub mod actor;
pub mod audit;
pub mod auto_approval;
pub mod claim;
pub mod config;
pub mod decision;
pub mod document;
pub mod duplicates;
pub mod error;
pub mod extraction;
pub mod plan;
pub mod ports;
pub mod rules;
pub mod services;
pub mod workflow;

pub use actor::{Actor, Role};
pub use audit::{AuditAction, AuditEntry, AuditSink};
pub use auto_approval::{AutoApprovalEvaluator, AutoApprovalInput, AutoApprovalVerdict};
pub use claim::{Claim, ClaimCategory, ClaimStatus};
pub use config::EngineConfig;
pub use decision::{Decision, DecisionRequest, DecisionType};
pub use document::{ClaimDocument, DocumentUpload};
pub use duplicates::{DuplicateDetector, DuplicateMatch};
pub use error::ClaimError;
pub use extraction::{DocumentExtractor, ExtractedFields, Extraction, ExtractionError, SharedExtractor};
pub use plan::{MemberPolicy, Plan, PolicyStatus};
pub use ports::{ClaimCommit, ClaimQuery, ClaimStore};
pub use rules::{Severity, ValidationResult, ValidationRule, ValidationSummary};
pub use services::{ClaimDecisionService, DecisionOutcome, IntakeOutcome, ProcessingOutcome, Routing, ValidationReport};
pub use workflow::ClaimStateMachine;
