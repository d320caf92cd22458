//! End-to-end tests for the claims decision pipeline over the in-memory store

use std::sync::Arc;

use rust_decimal_macros::dec;

use core_kernel::{Money, UserId};

use domain_claims::actor::Actor;
use domain_claims::audit::AuditAction;
use domain_claims::claim::{Claim, ClaimCategory, ClaimStatus};
use domain_claims::config::EngineConfig;
use domain_claims::decision::DecisionRequest;
use domain_claims::duplicates::EXACT_FILE_DUPLICATE;
use domain_claims::plan::{MemberPolicy, Plan, PolicyStatus};
use domain_claims::ports::mock::InMemoryClaimStore;
use domain_claims::ports::ClaimStore;
use domain_claims::rules::{Severity, ValidationRule};
use domain_claims::services::{ClaimDecisionService, Routing};
use domain_claims::ClaimError;

use test_utils::*;

struct Harness {
    store: Arc<InMemoryClaimStore>,
    service: ClaimDecisionService,
    plan: Plan,
}

impl Harness {
    async fn new() -> Self {
        Self::with_plan(TestPlanBuilder::new().build()).await
    }

    async fn with_plan(plan: Plan) -> Self {
        let store = Arc::new(InMemoryClaimStore::new());
        store.insert_plan(plan.clone()).await;
        store
            .insert_member_policy(MemberPolicy::active(
                IdFixtures::claimant_id(),
                plan.id,
                StringFixtures::member_number(),
                TemporalFixtures::policy_start(),
            ))
            .await;
        for rule in standard_rules() {
            store.insert_rule(rule).await;
        }

        let service = ClaimDecisionService::new(store.clone(), EngineConfig::default());
        Self { store, service, plan }
    }

    fn with_extractor(mut self, extractor: &Arc<FixedExtractor>) -> Self {
        self.service = ClaimDecisionService::new(self.store.clone(), EngineConfig::default())
            .with_extractor(extractor.shared());
        self
    }

    async fn seed(&self, claim: Claim) -> Claim {
        self.store.insert_claim(claim.clone()).await;
        claim
    }

    fn claim(&self) -> TestClaimBuilder {
        TestClaimBuilder::new().with_plan(self.plan.id)
    }
}

fn standard_rules() -> Vec<ValidationRule> {
    vec![
        RuleBuilder::amount_limit("10000").with_name("Amount limit").with_order(1).build(),
        RuleBuilder::date_range().with_name("Service date window").with_order(2).build(),
        RuleBuilder::required_fields(&["service_date", "provider_name"])
            .with_name("Required fields")
            .with_order(3)
            .build(),
        RuleBuilder::eligibility().with_name("Active policy").with_order(4).build(),
    ]
}

fn agent() -> Actor {
    Actor::agent(IdFixtures::agent_id())
}

fn claimant() -> Actor {
    Actor::claimant(IdFixtures::claimant_id())
}

// ============================================================================
// Routing scenarios
// ============================================================================

mod routing_tests {
    use super::*;

    #[tokio::test]
    async fn test_small_clean_claim_is_auto_approved() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().with_amount(MoneyFixtures::usd_250()).build()).await;

        let outcome = h.service.process_claim(claim.id).await.unwrap();

        assert_eq!(outcome.routing, Routing::AutoApproved);
        assert_status(&outcome.claim, ClaimStatus::AutoApproved);
        assert!(outcome.claim.auto_approval_eligible);
        assert!(outcome.claim.processed_at.is_some());
        assert_eq!(outcome.claim.approved_amount, Some(MoneyFixtures::usd_250()));

        let decision = outcome.decision.expect("auto decision");
        assert!(decision.is_auto_decision);
        assert_eq!(decision.decided_by, None);
        assert_eq!(decision.approved_amount.map(|m| m.amount()), Some(dec!(250)));

        let decisions = h.store.decisions_for(claim.id).await.unwrap();
        assert_eq!(decisions.len(), 1);

        let timeline = h.service.timeline(claim.id).await.unwrap();
        assert_audit_actions(
            &timeline,
            &[AuditAction::StatusChange, AuditAction::StatusChange, AuditAction::AutoApprove],
        );
    }

    #[tokio::test]
    async fn test_claim_over_cap_goes_to_review() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().with_amount(MoneyFixtures::usd_750()).build()).await;

        let outcome = h.service.process_claim(claim.id).await.unwrap();

        assert_eq!(outcome.routing, Routing::PendingReview);
        assert_status(&outcome.claim, ClaimStatus::PendingReview);
        assert!(!outcome.claim.auto_approval_eligible);
        assert!(outcome
            .claim
            .auto_approval_reasons
            .contains(&"Amount $750.00 exceeds auto-approve cap $500.00".to_string()));
        assert!(outcome.decision.is_none());
        assert!(h.store.decisions_for(claim.id).await.unwrap().is_empty());

        let timeline = h.service.timeline(claim.id).await.unwrap();
        assert_audit_actions(
            &timeline,
            &[AuditAction::StatusChange, AuditAction::StatusChange, AuditAction::RouteToReview],
        );
    }

    #[tokio::test]
    async fn test_rule_errors_skip_validated() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().without_service_date().build()).await;

        let outcome = h.service.process_claim(claim.id).await.unwrap();

        assert_eq!(outcome.routing, Routing::PendingReview);
        let summary = outcome.summary.unwrap();
        assert!(!summary.is_valid);
        assert!(summary
            .error_messages
            .contains(&"Missing required fields: service_date".to_string()));

        let timeline = h.service.timeline(claim.id).await.unwrap();
        assert_eq!(timeline[0].after, Some(serde_json::json!({ "status": "PENDING_REVIEW" })));
    }

    #[tokio::test]
    async fn test_unknown_rule_type_fails_closed() {
        let h = Harness::new().await;
        h.store
            .insert_rule(RuleBuilder::new("horoscope").with_name("Stars aligned").build())
            .await;
        let claim = h.seed(h.claim().build()).await;

        let outcome = h.service.process_claim(claim.id).await.unwrap();

        assert_eq!(outcome.routing, Routing::PendingReview);
        let results = h.store.validation_results_for(claim.id).await.unwrap();
        assert_rule_failed(&results, "Stars aligned", "Unknown rule type: horoscope");
    }

    #[tokio::test]
    async fn test_plan_without_auto_approval_routes_to_review() {
        let h = Harness::with_plan(TestPlanBuilder::new().auto_approve(false).build()).await;
        let claim = h.seed(h.claim().build()).await;

        let outcome = h.service.process_claim(claim.id).await.unwrap();

        assert_eq!(outcome.routing, Routing::PendingReview);
        assert_eq!(
            outcome.claim.auto_approval_reasons,
            vec!["Auto-approval not enabled for this plan".to_string()]
        );
    }

    #[tokio::test]
    async fn test_processing_a_decided_claim_is_rejected() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().with_status(ClaimStatus::Approved).build()).await;

        let err = h.service.process_claim(claim.id).await.unwrap_err();
        assert!(matches!(
            err,
            ClaimError::IllegalTransition {
                from: ClaimStatus::Approved,
                ..
            }
        ));
    }
}

// ============================================================================
// Rule engine through the service
// ============================================================================

mod validation_tests {
    use super::*;

    #[tokio::test]
    async fn test_short_npi_fails_at_configured_severity() {
        let h = Harness::new().await;
        h.store
            .insert_rule(
                RuleBuilder::provider_validation()
                    .with_name("Provider NPI")
                    .with_severity(Severity::Warning)
                    .build(),
            )
            .await;
        let claim = h.seed(h.claim().with_npi(StringFixtures::short_npi()).build()).await;

        let report = h.service.validate(claim.id).await.unwrap();

        let result = assert_rule_failed(
            &report.results,
            "Provider NPI",
            "Invalid NPI format (must be 10 digits)",
        );
        assert_eq!(result.severity, Severity::Warning);
        assert!(report.summary.is_valid);
        assert_eq!(report.summary.warnings, 1);
    }

    #[tokio::test]
    async fn test_validation_is_deterministic_and_replaces_results() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().build()).await;

        let first = h.service.validate(claim.id).await.unwrap();
        let second = h.service.validate(claim.id).await.unwrap();

        let pairs = |results: &[domain_claims::ValidationResult]| -> Vec<(String, bool)> {
            results.iter().map(|r| (r.rule_name.clone(), r.passed)).collect()
        };
        assert_eq!(pairs(&first.results), pairs(&second.results));
        assert_all_rules_passed(&second.results);

        let stored = h.store.validation_results_for(claim.id).await.unwrap();
        assert_eq!(stored.len(), standard_rules().len());
    }

    async fn store_with_policies(plan: &Plan, policies: Vec<MemberPolicy>) -> Arc<InMemoryClaimStore> {
        let store = Arc::new(InMemoryClaimStore::new());
        store.insert_plan(plan.clone()).await;
        for policy in policies {
            store.insert_member_policy(policy).await;
        }
        store
            .insert_rule(RuleBuilder::eligibility().with_name("Active policy").build())
            .await;
        store
    }

    fn policy_from(plan: &Plan, start_days_ago: u64) -> MemberPolicy {
        MemberPolicy::active(
            IdFixtures::claimant_id(),
            plan.id,
            StringFixtures::member_number(),
            TemporalFixtures::days_ago(start_days_ago),
        )
    }

    #[tokio::test]
    async fn test_renewed_policy_satisfies_eligibility() {
        let plan = TestPlanBuilder::new().build();
        let mut lapsed = policy_from(&plan, 800);
        lapsed.status = PolicyStatus::Expired;
        lapsed.end_date = Some(TemporalFixtures::days_ago(400));
        let renewed = policy_from(&plan, 30);
        let store = store_with_policies(&plan, vec![lapsed, renewed]).await;
        let service = ClaimDecisionService::new(store.clone(), EngineConfig::default());

        let claim = TestClaimBuilder::new()
            .with_plan(plan.id)
            .with_service_date(TemporalFixtures::days_ago(5))
            .build();
        store.insert_claim(claim.clone()).await;

        let report = service.validate(claim.id).await.unwrap();

        assert_all_rules_passed(&report.results);
        assert!(report.summary.is_valid);
    }

    #[tokio::test]
    async fn test_older_active_policy_covers_past_service_date() {
        let plan = TestPlanBuilder::new().build();
        let mut previous = policy_from(&plan, 400);
        previous.end_date = Some(TemporalFixtures::days_ago(31));
        let current = policy_from(&plan, 30);
        let store = store_with_policies(&plan, vec![previous, current]).await;
        let service = ClaimDecisionService::new(store.clone(), EngineConfig::default());

        let claim = TestClaimBuilder::new()
            .with_plan(plan.id)
            .with_service_date(TemporalFixtures::days_ago(60))
            .build();
        store.insert_claim(claim.clone()).await;

        let report = service.validate(claim.id).await.unwrap();
        assert_all_rules_passed(&report.results);
    }

    #[tokio::test]
    async fn test_lapsed_policy_alone_fails_eligibility() {
        let plan = TestPlanBuilder::new().build();
        let mut lapsed = policy_from(&plan, 800);
        lapsed.status = PolicyStatus::Expired;
        let store = store_with_policies(&plan, vec![lapsed]).await;
        let service = ClaimDecisionService::new(store.clone(), EngineConfig::default());

        let claim = TestClaimBuilder::new().with_plan(plan.id).build();
        store.insert_claim(claim.clone()).await;

        let report = service.validate(claim.id).await.unwrap();
        assert_rule_failed(
            &report.results,
            "Active policy",
            "Policy is not active (status: expired)",
        );
    }

    #[tokio::test]
    async fn test_evaluate_auto_approval_writes_nothing() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().build()).await;

        let verdict = h.service.evaluate_auto_approval(claim.id).await.unwrap();

        assert!(verdict.eligible);
        let stored = h.service.get_claim(claim.id).await.unwrap();
        assert_eq!(stored.version, claim.version);
        assert_eq!(stored.status, ClaimStatus::Extracted);
    }
}

// ============================================================================
// Duplicate detection
// ============================================================================

mod duplicate_tests {
    use super::*;

    #[tokio::test]
    async fn test_near_identical_amounts_on_same_day_are_recorded() {
        let h = Harness::new().await;
        let date = TemporalFixtures::recent_service_date();
        let earlier = h
            .seed(
                h.claim()
                    .with_amount(MoneyFixtures::usd_100())
                    .with_service_date(date)
                    .build(),
            )
            .await;
        let claim = h
            .seed(
                h.claim()
                    .with_amount(MoneyFixtures::usd_102())
                    .with_service_date(date)
                    .with_provider("Lakeside Imaging")
                    .with_category(ClaimCategory::Hospital)
                    .with_procedure_codes(&["70450"])
                    .build(),
            )
            .await;

        let matches = h.service.find_duplicates(claim.id).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_claim_id, earlier.id);
        assert!(matches[0].similarity_score >= 0.6);
        assert_eq!(matches[0].reasons.len(), 2);

        let stored = h.service.get_claim(claim.id).await.unwrap();
        assert_duplicate_score_consistent(&stored, &matches);
    }

    #[tokio::test]
    async fn test_rerunning_detection_records_no_second_row() {
        let h = Harness::new().await;
        h.seed(h.claim().build()).await;
        let claim = h.seed(h.claim().build()).await;

        h.service.find_duplicates(claim.id).await.unwrap();
        h.service.find_duplicates(claim.id).await.unwrap();

        let recorded = h.store.matches_for(claim.id).await.unwrap();
        assert_eq!(recorded.len(), 1);
        let stored = h.service.get_claim(claim.id).await.unwrap();
        assert_duplicate_score_consistent(&stored, &recorded);
    }

    #[tokio::test]
    async fn test_no_candidates_gives_zero_score() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().with_duplicate_score(0.4).build()).await;

        let matches = h.service.find_duplicates(claim.id).await.unwrap();

        assert!(matches.is_empty());
        assert_eq!(h.service.get_claim(claim.id).await.unwrap().duplicate_score, 0.0);
    }

    #[tokio::test]
    async fn test_other_claimants_and_deleted_claims_are_ignored() {
        let h = Harness::new().await;
        h.seed(h.claim().with_claimant(UserId::new()).build()).await;
        let mut deleted = h.claim().build();
        deleted.deleted_at = Some(chrono::Utc::now());
        h.seed(deleted).await;
        let claim = h.seed(h.claim().build()).await;

        assert!(h.service.find_duplicates(claim.id).await.unwrap().is_empty());
    }
}

// ============================================================================
// Document intake
// ============================================================================

mod intake_tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use core_kernel::{ClaimId, DomainPort, PlanId, PortError};
    use domain_claims::audit::{AuditEntry, AuditSink};
    use domain_claims::decision::Decision;
    use domain_claims::document::ClaimDocument;
    use domain_claims::duplicates::DuplicateMatch;
    use domain_claims::ports::{ClaimCommit, ClaimQuery};
    use domain_claims::ValidationResult;

    async fn submitted_draft(h: &Harness) -> Claim {
        let mut draft = TestClaimBuilder::draft().build();
        draft.plan_id = Some(h.plan.id);
        let claim = h.service.create_claim(draft, &claimant()).await.unwrap();
        h.service.submit(claim.id, &claimant()).await.unwrap()
    }

    #[tokio::test]
    async fn test_full_pipeline_from_draft_to_auto_approval() {
        let extractor = FixedExtractor::returning(ExtractionFixtures::medical_bill("250.00"));
        let h = Harness::new().await.with_extractor(&extractor);
        let claim = submitted_draft(&h).await;

        let intake = h
            .service
            .intake_document(claim.id, DocumentFixtures::bill(), &claimant())
            .await
            .unwrap();

        assert_status(&intake.claim, ClaimStatus::Extracted);
        assert_eq!(intake.claim.total_amount, MoneyFixtures::usd_250());
        assert_eq!(intake.claim.category, ClaimCategory::Medical);
        assert_eq!(intake.claim.extraction_confidence, Some(0.9));
        assert_eq!(intake.claim.ocr_quality_score, Some(0.9));
        assert!(intake.filled_fields.contains(&"total_amount"));

        let outcome = h.service.process_claim(claim.id).await.unwrap();
        assert_eq!(outcome.routing, Routing::AutoApproved);

        let timeline = h.service.timeline(claim.id).await.unwrap();
        assert_audit_actions(
            &timeline,
            &[
                AuditAction::Create,
                AuditAction::StatusChange,
                AuditAction::DocumentAdded,
                AuditAction::StatusChange,
                AuditAction::StatusChange,
                AuditAction::StatusChange,
                AuditAction::AutoApprove,
            ],
        );
    }

    #[tokio::test]
    async fn test_extraction_failure_keeps_document_and_routes_to_review() {
        let extractor = FixedExtractor::failing("model offline");
        let h = Harness::new().await.with_extractor(&extractor);
        let claim = submitted_draft(&h).await;

        let intake = h
            .service
            .intake_document(claim.id, DocumentFixtures::bill(), &claimant())
            .await
            .unwrap();
        assert_status(&intake.claim, ClaimStatus::Submitted);
        assert_eq!(h.store.documents_for(claim.id).await.unwrap().len(), 1);

        let outcome = h.service.process_claim(claim.id).await.unwrap();
        assert_eq!(outcome.routing, Routing::PendingReview);
        assert_eq!(
            outcome.claim.auto_approval_reasons,
            vec!["Extraction data unavailable".to_string()]
        );
    }

    #[tokio::test]
    async fn test_exact_file_duplicate_forces_full_score() {
        let h = Harness::new().await;
        let original = submitted_draft(&h).await;
        let copy = submitted_draft(&h).await;

        h.service
            .intake_document(original.id, DocumentFixtures::bill(), &claimant())
            .await
            .unwrap();
        let intake = h
            .service
            .intake_document(copy.id, DocumentFixtures::bill(), &claimant())
            .await
            .unwrap();

        assert_eq!(intake.exact_duplicate_of, Some(original.id));
        assert_eq!(intake.claim.duplicate_score, 1.0);

        let matches = h.store.matches_for(copy.id).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_claim_id, original.id);
        assert_eq!(matches[0].reasons, vec![EXACT_FILE_DUPLICATE.to_string()]);
        assert_duplicate_score_consistent(&intake.claim, &matches);
    }

    /// Hides other claims' documents from the first hash lookups, as when an
    /// identical upload commits between the lookup and this claim's commit
    struct LateHashStore {
        inner: Arc<InMemoryClaimStore>,
        misses: AtomicUsize,
    }

    impl DomainPort for LateHashStore {}

    #[async_trait]
    impl AuditSink for LateHashStore {
        async fn append(&self, entry: AuditEntry) -> Result<(), PortError> {
            self.inner.append(entry).await
        }

        async fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>, PortError> {
            self.inner.entries_for(entity_type, entity_id).await
        }
    }

    #[async_trait]
    impl ClaimStore for LateHashStore {
        async fn get_claim(&self, id: ClaimId) -> Result<Claim, PortError> {
            self.inner.get_claim(id).await
        }

        async fn find_claims(&self, query: ClaimQuery) -> Result<Vec<Claim>, PortError> {
            self.inner.find_claims(query).await
        }

        async fn get_plan(&self, id: PlanId) -> Result<Option<Plan>, PortError> {
            self.inner.get_plan(id).await
        }

        async fn member_policies(&self, user_id: UserId, plan_id: PlanId) -> Result<Vec<MemberPolicy>, PortError> {
            self.inner.member_policies(user_id, plan_id).await
        }

        async fn rules_for(&self, plan_id: Option<PlanId>) -> Result<Vec<ValidationRule>, PortError> {
            self.inner.rules_for(plan_id).await
        }

        async fn documents_for(&self, claim_id: ClaimId) -> Result<Vec<ClaimDocument>, PortError> {
            self.inner.documents_for(claim_id).await
        }

        async fn find_document_by_hash(
            &self,
            file_hash: &str,
            excluding: ClaimId,
        ) -> Result<Option<ClaimDocument>, PortError> {
            let hidden = self
                .misses
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if hidden {
                return Ok(None);
            }
            self.inner.find_document_by_hash(file_hash, excluding).await
        }

        async fn matches_for(&self, claim_id: ClaimId) -> Result<Vec<DuplicateMatch>, PortError> {
            self.inner.matches_for(claim_id).await
        }

        async fn decisions_for(&self, claim_id: ClaimId) -> Result<Vec<Decision>, PortError> {
            self.inner.decisions_for(claim_id).await
        }

        async fn validation_results_for(&self, claim_id: ClaimId) -> Result<Vec<ValidationResult>, PortError> {
            self.inner.validation_results_for(claim_id).await
        }

        async fn commit(&self, commit: ClaimCommit) -> Result<Claim, PortError> {
            self.inner.commit(commit).await
        }
    }

    #[tokio::test]
    async fn test_identical_upload_landing_during_intake_is_flagged() {
        let h = Harness::new().await;
        let original = submitted_draft(&h).await;
        let copy = submitted_draft(&h).await;
        h.service
            .intake_document(original.id, DocumentFixtures::bill(), &claimant())
            .await
            .unwrap();

        let late = Arc::new(LateHashStore {
            inner: h.store.clone(),
            misses: AtomicUsize::new(1),
        });
        let service = ClaimDecisionService::new(late, EngineConfig::default());
        let intake = service
            .intake_document(copy.id, DocumentFixtures::bill(), &claimant())
            .await
            .unwrap();

        assert_eq!(intake.exact_duplicate_of, Some(original.id));
        assert_eq!(intake.claim.duplicate_score, 1.0);
        let matches = h.store.matches_for(copy.id).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_claim_id, original.id);
        assert_eq!(matches[0].reasons, vec![EXACT_FILE_DUPLICATE.to_string()]);
        assert_eq!(h.store.documents_for(copy.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reupload_on_same_claim_is_a_no_op() {
        let extractor = FixedExtractor::returning(ExtractionFixtures::medical_bill("250.00"));
        let h = Harness::new().await.with_extractor(&extractor);
        let claim = submitted_draft(&h).await;

        let first = h
            .service
            .intake_document(claim.id, DocumentFixtures::bill(), &claimant())
            .await
            .unwrap();
        let second = h
            .service
            .intake_document(claim.id, DocumentFixtures::bill(), &claimant())
            .await
            .unwrap();

        assert!(second.already_attached);
        assert_eq!(second.document.id, first.document.id);
        assert_eq!(second.claim.version, first.claim.version);
        assert_eq!(extractor.calls(), 1);
        assert_eq!(h.store.documents_for(claim.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_extractable_upload_skips_extraction() {
        let extractor = FixedExtractor::returning(ExtractionFixtures::medical_bill("250.00"));
        let h = Harness::new().await.with_extractor(&extractor);
        let claim = submitted_draft(&h).await;

        let intake = h
            .service
            .intake_document(claim.id, DocumentFixtures::note(), &claimant())
            .await
            .unwrap();

        assert_eq!(extractor.calls(), 0);
        assert_status(&intake.claim, ClaimStatus::Submitted);
        assert!(intake.claim.total_amount.is_zero());
    }
}

// ============================================================================
// Human decisions and concurrency
// ============================================================================

mod decision_tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_decisions_commit_exactly_once() {
        let h = Harness::new().await;
        let claim = h
            .seed(h.claim().with_status(ClaimStatus::PendingReview).build())
            .await;
        let snapshot = h.service.get_claim(claim.id).await.unwrap();

        let first = Actor::agent(UserId::new());
        let second = Actor::agent(UserId::new());
        let (a, b) = tokio::join!(
            h.service.decide_claim(&snapshot, DecisionRequest::approve(), &first),
            h.service.decide_claim(&snapshot, DecisionRequest::deny("NOT_COVERED"), &second),
        );

        let outcomes = [a, b];
        let committed = outcomes.iter().filter(|r| r.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|r| matches!(r, Err(err) if err.is_conflict()))
            .count();
        assert_eq!(committed, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(h.store.decisions_for(claim.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_agent_approval_defaults_to_total() {
        let h = Harness::new().await;
        let claim = h
            .seed(h.claim().with_status(ClaimStatus::PendingReview).build())
            .await;

        let outcome = h
            .service
            .decide(claim.id, DecisionRequest::approve(), &agent())
            .await
            .unwrap();

        assert_status(&outcome.claim, ClaimStatus::Approved);
        assert_eq!(outcome.claim.approved_amount, Some(claim.total_amount));
        assert_eq!(outcome.decision.decided_by, Some(IdFixtures::agent_id()));
        assert!(!outcome.decision.is_auto_decision);

        let closed = h.service.close(claim.id, &agent()).await.unwrap();
        assert_status(&closed, ClaimStatus::Closed);
    }

    #[tokio::test]
    async fn test_partial_approval_amount_is_kept() {
        let h = Harness::new().await;
        let claim = h
            .seed(h.claim().with_status(ClaimStatus::PendingReview).build())
            .await;
        let mut request = DecisionRequest::approve();
        request.approved_amount = Some(MoneyFixtures::usd_100());

        let outcome = h.service.decide(claim.id, request, &agent()).await.unwrap();
        assert_money_approx_eq(
            &outcome.claim.approved_amount.unwrap(),
            &MoneyFixtures::usd_100(),
            dec!(0),
        );
    }

    #[tokio::test]
    async fn test_approval_in_another_currency_is_rejected() {
        let h = Harness::new().await;
        let claim = h
            .seed(h.claim().with_status(ClaimStatus::PendingReview).build())
            .await;
        let mut request = DecisionRequest::approve();
        request.approved_amount = Some(MoneyFixtures::eur_100());

        let err = h.service.decide(claim.id, request, &agent()).await.unwrap_err();
        assert!(matches!(err, ClaimError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_claimant_cannot_decide() {
        let h = Harness::new().await;
        let claim = h
            .seed(h.claim().with_status(ClaimStatus::PendingReview).build())
            .await;

        let err = h
            .service
            .decide(claim.id, DecisionRequest::approve(), &claimant())
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_pend_then_resubmit_keeps_first_submission_time() {
        let h = Harness::new().await;
        let mut pending = h.claim().with_status(ClaimStatus::PendingReview).build();
        let first_submission = chrono::Utc::now() - chrono::Duration::days(3);
        pending.submitted_at = Some(first_submission);
        let claim = h.seed(pending).await;

        let pended = h
            .service
            .decide(claim.id, DecisionRequest::pend("Need itemised bill"), &agent())
            .await
            .unwrap();
        assert_status(&pended.claim, ClaimStatus::Pended);

        let resubmitted = h.service.submit(claim.id, &claimant()).await.unwrap();
        assert_status(&resubmitted, ClaimStatus::Submitted);
        assert_eq!(resubmitted.submitted_at, Some(first_submission));
    }

    #[tokio::test]
    async fn test_draft_cannot_be_approved() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().with_status(ClaimStatus::Draft).build()).await;

        let err = h
            .service
            .decide(claim.id, DecisionRequest::approve(), &agent())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClaimError::IllegalTransition {
                from: ClaimStatus::Draft,
                to: ClaimStatus::Approved
            }
        ));
    }
}

// ============================================================================
// Queue, assignment and deletion
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_review_queue_is_oldest_first_and_skips_deleted() {
        let h = Harness::new().await;
        let mut older = h.claim().with_status(ClaimStatus::PendingReview).build();
        older.created_at = chrono::Utc::now() - chrono::Duration::hours(2);
        let older = h.seed(older).await;
        let newer = h.seed(h.claim().with_status(ClaimStatus::PendingReview).build()).await;
        let mut gone = h.claim().with_status(ClaimStatus::PendingReview).build();
        gone.deleted_at = Some(chrono::Utc::now());
        h.seed(gone).await;
        h.seed(h.claim().build()).await;

        let queue = h.service.review_queue(None).await.unwrap();
        let ids: Vec<_> = queue.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);

        let first_only = h.service.review_queue(Some(1)).await.unwrap();
        assert_eq!(first_only.len(), 1);
    }

    #[tokio::test]
    async fn test_assign_records_audit() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().with_status(ClaimStatus::PendingReview).build()).await;

        let assigned = h
            .service
            .assign(claim.id, IdFixtures::agent_id(), &agent())
            .await
            .unwrap();

        assert_eq!(assigned.assigned_agent_id, Some(IdFixtures::agent_id()));
        assert_eq!(assigned.status, ClaimStatus::PendingReview);
        let timeline = h.service.timeline(claim.id).await.unwrap();
        assert_audit_actions(&timeline, &[AuditAction::Assign]);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_claim_but_keeps_it_resolvable() {
        let h = Harness::new().await;
        let draft = h.service.create_claim(TestClaimBuilder::draft().build(), &claimant()).await.unwrap();

        let deleted = h.service.soft_delete(draft.id, &claimant()).await.unwrap();

        assert!(deleted.is_deleted());
        assert!(h.service.get_claim(draft.id).await.unwrap().is_deleted());
        let err = h.service.submit(draft.id, &claimant()).await.unwrap_err();
        assert!(matches!(err, ClaimError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_deleted_claim_is_not_revalidated() {
        let h = Harness::new().await;
        let draft = h.service.create_claim(TestClaimBuilder::draft().build(), &claimant()).await.unwrap();
        let deleted = h.service.soft_delete(draft.id, &claimant()).await.unwrap();

        let err = h.service.validate(draft.id).await.unwrap_err();
        assert!(matches!(err, ClaimError::NotFound { .. }));
        let err = h.service.find_duplicates(draft.id).await.unwrap_err();
        assert!(matches!(err, ClaimError::NotFound { .. }));

        let stored = h.service.get_claim(draft.id).await.unwrap();
        assert_eq!(stored.version, deleted.version);
        assert!(h.store.validation_results_for(draft.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decided_claims_cannot_be_deleted() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().with_status(ClaimStatus::Approved).build()).await;

        let err = h.service.soft_delete(claim.id, &claimant()).await.unwrap_err();
        assert!(matches!(err, ClaimError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_transition_status_refuses_decision_targets() {
        let h = Harness::new().await;
        let claim = h.seed(h.claim().with_status(ClaimStatus::Validated).build()).await;

        let err = h
            .service
            .transition_status(claim.id, ClaimStatus::Approved, &agent(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::InvalidInput(_)));

        let routed = h
            .service
            .transition_status(claim.id, ClaimStatus::PendingReview, &agent(), Some("manual check"))
            .await
            .unwrap();
        assert_status(&routed, ClaimStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_new_claims_must_be_drafts() {
        let h = Harness::new().await;
        let err = h
            .service
            .create_claim(h.claim().build(), &claimant())
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_zero_amount_draft_is_accepted() {
        let h = Harness::new().await;
        let draft = TestClaimBuilder::draft()
            .with_amount(Money::zero(core_kernel::Currency::USD))
            .build();
        let claim = h.service.create_claim(draft, &claimant()).await.unwrap();
        assert!(claim.claim_number.starts_with("CLM-"));
        assert_status(&claim, ClaimStatus::Draft);
    }
}
