//! PgClaimStore integration tests
//!
//! These run against a throwaway PostgreSQL container and need Docker:
//!
//! ```text
//! cargo test -p infra_db -- --ignored
//! ```

use std::sync::Arc;

use rust_decimal_macros::dec;

use domain_claims::actor::Actor;
use domain_claims::audit::{AuditAction, AuditEntry, AuditSink};
use domain_claims::claim::{Claim, ClaimStatus};
use domain_claims::config::EngineConfig;
use domain_claims::decision::DecisionRequest;
use domain_claims::duplicates::DuplicateMatch;
use domain_claims::plan::{MemberPolicy, Plan};
use domain_claims::ports::{ClaimCommit, ClaimQuery, ClaimStore};
use domain_claims::services::{ClaimDecisionService, Routing};
use infra_db::PgClaimStore;

use test_utils::*;

struct PgHarness {
    _db: TestDatabase,
    store: Arc<PgClaimStore>,
    plan: Plan,
}

impl PgHarness {
    async fn new() -> Self {
        let db = create_isolated_test_database()
            .await
            .expect("Failed to start PostgreSQL container");
        let store = Arc::new(db.claim_store());

        let plan = TestPlanBuilder::new().build();
        store.insert_plan(&plan).await.unwrap();
        store
            .insert_member_policy(&MemberPolicy::active(
                IdFixtures::claimant_id(),
                plan.id,
                StringFixtures::member_number(),
                TemporalFixtures::policy_start(),
            ))
            .await
            .unwrap();
        for rule in [
            RuleBuilder::amount_limit("10000").with_order(1).build(),
            RuleBuilder::date_range().with_order(2).build(),
            RuleBuilder::required_fields(&["service_date", "provider_name"]).with_order(3).build(),
            RuleBuilder::eligibility().with_order(4).build(),
        ] {
            store.insert_rule(&rule).await.unwrap();
        }

        Self { _db: db, store, plan }
    }

    fn service(&self) -> ClaimDecisionService {
        ClaimDecisionService::new(self.store.clone(), EngineConfig::default())
    }

    async fn seed(&self, claim: Claim) -> Claim {
        self.store.commit(ClaimCommit::insert(claim)).await.unwrap()
    }

    fn claim(&self) -> TestClaimBuilder {
        TestClaimBuilder::new().with_plan(self.plan.id)
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_claim_round_trips_through_postgres() {
    let h = PgHarness::new().await;
    let claim = h
        .seed(h.claim().with_procedure_codes(&["99213", "J1100"]).build())
        .await;

    let loaded = h.store.get_claim(claim.id).await.unwrap();

    assert_eq!(loaded.id, claim.id);
    assert_eq!(loaded.status, ClaimStatus::Extracted);
    assert_money_approx_eq(&loaded.total_amount, &claim.total_amount, dec!(0.0001));
    assert_eq!(loaded.procedure_codes, vec!["99213", "J1100"]);
    assert_eq!(loaded.version, claim.version);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_missing_claim_is_not_found() {
    let h = PgHarness::new().await;
    let err = h.store.get_claim(core_kernel::ClaimId::new()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stale_commit_is_rejected_and_writes_nothing() {
    let h = PgHarness::new().await;
    let original = h.seed(h.claim().build()).await;

    let mut first = original.clone();
    first.status = ClaimStatus::PendingReview;
    let committed = h
        .store
        .commit(ClaimCommit::update(&original, first))
        .await
        .unwrap();
    assert_eq!(committed.version, original.version + 1);

    let mut second = original.clone();
    second.status = ClaimStatus::Validated;
    let err = h
        .store
        .commit(
            ClaimCommit::update(&original, second)
                .audit(AuditEntry::for_claim(original.id, AuditAction::StatusChange, None)),
        )
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    let stored = h.store.get_claim(original.id).await.unwrap();
    assert_eq!(stored.status, ClaimStatus::PendingReview);
    assert!(h
        .store
        .entries_for("claim", &original.id.to_string())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_inserting_twice_conflicts() {
    let h = PgHarness::new().await;
    let claim = h.seed(h.claim().build()).await;

    let err = h.store.commit(ClaimCommit::insert(claim)).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_duplicate_pairs_are_recorded_once() {
    let h = PgHarness::new().await;
    let earlier = h.seed(h.claim().with_status(ClaimStatus::Submitted).build()).await;
    let claim = h.seed(h.claim().build()).await;

    let found = DuplicateMatch::new(claim.id, earlier.id, 0.7, vec!["Same service date".into()]);
    let again = DuplicateMatch::new(claim.id, earlier.id, 0.7, vec!["Same service date".into()]);

    let claim = h
        .store
        .commit(ClaimCommit::update(&claim, claim.clone()).duplicate_matches(vec![found]))
        .await
        .unwrap();
    h.store
        .commit(ClaimCommit::update(&claim, claim.clone()).duplicate_matches(vec![again]))
        .await
        .unwrap();

    let matches = h.store.matches_for(claim.id).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].matched_claim_id, earlier.id);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_find_claims_skips_deleted_and_orders_oldest_first() {
    let h = PgHarness::new().await;
    let first = h.seed(h.claim().with_status(ClaimStatus::PendingReview).build()).await;
    let second = h.seed(h.claim().with_status(ClaimStatus::PendingReview).build()).await;

    let mut gone = h.claim().with_status(ClaimStatus::PendingReview).build();
    gone.deleted_at = Some(chrono::Utc::now());
    h.seed(gone).await;

    let queue = h.store.find_claims(ClaimQuery::review_queue()).await.unwrap();
    let ids: Vec<_> = queue.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);

    let limited = h
        .store
        .find_claims(ClaimQuery::review_queue().limit(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_pipeline_auto_approves_against_postgres() {
    let h = PgHarness::new().await;
    let claim = h.seed(h.claim().with_amount(MoneyFixtures::usd_250()).build()).await;

    let outcome = h.service().process_claim(claim.id).await.unwrap();

    assert_eq!(outcome.routing, Routing::AutoApproved);
    let stored = h.store.get_claim(claim.id).await.unwrap();
    assert_status(&stored, ClaimStatus::AutoApproved);
    assert_eq!(h.store.decisions_for(claim.id).await.unwrap().len(), 1);
    assert_all_rules_passed(&h.store.validation_results_for(claim.id).await.unwrap());

    let timeline = h.service().timeline(claim.id).await.unwrap();
    assert_audit_actions(
        &timeline,
        &[AuditAction::StatusChange, AuditAction::StatusChange, AuditAction::AutoApprove],
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_agent_decision_is_persisted() {
    let h = PgHarness::new().await;
    let claim = h.seed(h.claim().with_amount(MoneyFixtures::usd_750()).build()).await;
    let service = h.service();

    let outcome = service.process_claim(claim.id).await.unwrap();
    assert_eq!(outcome.routing, Routing::PendingReview);

    let agent = Actor::agent(IdFixtures::agent_id());
    let decided = service
        .decide(claim.id, DecisionRequest::approve(), &agent)
        .await
        .unwrap();

    assert_status(&decided.claim, ClaimStatus::Approved);
    let decisions = h.store.decisions_for(claim.id).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].decided_by, Some(IdFixtures::agent_id()));
    assert_eq!(decisions[0].approved_amount, Some(MoneyFixtures::usd_750()));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_member_policies_returns_renewals_latest_first() {
    let h = PgHarness::new().await;
    let mut lapsed = MemberPolicy::active(
        IdFixtures::claimant_id(),
        h.plan.id,
        StringFixtures::member_number(),
        TemporalFixtures::days_ago(800),
    );
    lapsed.status = domain_claims::plan::PolicyStatus::Expired;
    lapsed.end_date = Some(TemporalFixtures::days_ago(400));
    h.store.insert_member_policy(&lapsed).await.unwrap();

    let policies = h
        .store
        .member_policies(IdFixtures::claimant_id(), h.plan.id)
        .await
        .unwrap();

    assert_eq!(policies.len(), 2);
    assert!(policies[0].start_date > policies[1].start_date);
    assert_eq!(policies[1], lapsed);
}
