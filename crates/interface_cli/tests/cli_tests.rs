//! Runner commands against the in-memory store

use std::sync::Arc;

use rust_decimal_macros::dec;

use core_kernel::{Currency, Money, PlanId};
use domain_claims::claim::{Claim, ClaimStatus};
use domain_claims::config::EngineConfig;
use domain_claims::plan::MemberPolicy;
use domain_claims::ports::mock::InMemoryClaimStore;
use domain_claims::ports::ClaimStore;
use domain_claims::services::ClaimDecisionService;
use interface_cli::{Command, DecisionArg};

use test_utils::*;

async fn setup() -> (Arc<InMemoryClaimStore>, ClaimDecisionService, PlanId) {
    let store = Arc::new(InMemoryClaimStore::new());
    let plan = TestPlanBuilder::new().build();
    store.insert_plan(plan.clone()).await;
    store
        .insert_member_policy(MemberPolicy::active(
            IdFixtures::claimant_id(),
            plan.id,
            StringFixtures::member_number(),
            TemporalFixtures::policy_start(),
        ))
        .await;
    store.insert_rule(RuleBuilder::amount_limit("10000").build()).await;
    store.insert_rule(RuleBuilder::eligibility().build()).await;

    let service = ClaimDecisionService::new(store.clone(), EngineConfig::default());
    (store, service, plan.id)
}

fn claim_for(plan_id: PlanId) -> TestClaimBuilder {
    TestClaimBuilder::new().with_plan(plan_id)
}

async fn seed(store: &InMemoryClaimStore, claim: Claim) -> Claim {
    store.insert_claim(claim.clone()).await;
    claim
}

#[tokio::test]
async fn test_process_renders_routing() {
    let (store, service, plan_id) = setup().await;
    let claim = seed(&store, claim_for(plan_id).with_amount(MoneyFixtures::usd_250()).build()).await;

    let output = Command::Process { claim_id: claim.id }
        .execute(&service)
        .await
        .unwrap();

    assert_eq!(output["routing"], "auto_approved");
    assert_eq!(output["claim"]["status"], "AUTO_APPROVED");
    assert_eq!(output["decision"]["is_auto_decision"], true);
}

#[tokio::test]
async fn test_evaluate_does_not_change_the_claim() {
    let (store, service, plan_id) = setup().await;
    let claim = seed(&store, claim_for(plan_id).with_amount(MoneyFixtures::usd_750()).build()).await;

    let output = Command::Evaluate { claim_id: claim.id }
        .execute(&service)
        .await
        .unwrap();

    assert_eq!(output["eligible"], false);
    let stored = store.get_claim(claim.id).await.unwrap();
    assert_eq!(stored.status, ClaimStatus::Extracted);
    assert_eq!(stored.version, claim.version);
}

#[tokio::test]
async fn test_queue_lists_pending_claims() {
    let (store, service, plan_id) = setup().await;
    let waiting = seed(&store, claim_for(plan_id).with_status(ClaimStatus::PendingReview).build()).await;
    seed(&store, claim_for(plan_id).with_status(ClaimStatus::Approved).build()).await;

    let output = Command::Queue { limit: Some(10) }
        .execute(&service)
        .await
        .unwrap();

    let queue = output.as_array().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0]["id"], serde_json::to_value(waiting.id).unwrap());
}

#[tokio::test]
async fn test_decide_uses_claim_currency_for_partial_amount() {
    let (store, service, plan_id) = setup().await;
    let claim = seed(
        &store,
        claim_for(plan_id)
            .with_amount(MoneyFixtures::usd_750())
            .with_status(ClaimStatus::PendingReview)
            .build(),
    )
    .await;

    let output = Command::Decide {
        claim_id: claim.id,
        decision: DecisionArg::Approve,
        agent: IdFixtures::agent_id(),
        amount: Some(dec!(600)),
        reason_code: None,
        notes: Some("Partial coverage".into()),
    }
    .execute(&service)
    .await
    .unwrap();

    assert_eq!(output["claim"]["status"], "APPROVED");
    let stored = store.get_claim(claim.id).await.unwrap();
    assert_eq!(stored.approved_amount, Some(Money::new(dec!(600), Currency::USD)));
}

#[tokio::test]
async fn test_decide_on_unknown_claim_fails() {
    let (_store, service, _plan_id) = setup().await;

    let result = Command::Decide {
        claim_id: core_kernel::ClaimId::new(),
        decision: DecisionArg::Deny,
        agent: IdFixtures::agent_id(),
        amount: None,
        reason_code: Some("NOT_COVERED".into()),
        notes: None,
    }
    .execute(&service)
    .await;

    assert!(matches!(result, Err(domain_claims::ClaimError::NotFound { .. })));
}
