//! Claims Domain Ports
//!
//! The pipeline talks to persistence through [`ClaimStore`]. Two adapters
//! implement it:
//!
//! - **PostgreSQL**: `infra_db::PgClaimStore`
//! - **In-memory**: [`mock::InMemoryClaimStore`] for tests and demos
//!
//! Every mutation goes through [`ClaimStore::commit`], a single atomic
//! compare-and-set on the claim's `(status, version)` that also writes the
//! decision, documents, duplicate matches, validation results and audit
//! entries produced by one step of the pipeline.
//!
//! ```rust,ignore
//! let store: Arc<dyn ClaimStore> = Arc::new(PgClaimStore::new(pool));
//! let service = ClaimDecisionService::new(store, EngineConfig::default());
//! service.process_claim(claim_id).await?;
//! ```

use async_trait::async_trait;

use core_kernel::{ClaimId, PlanId, PortError, UserId};

use crate::audit::{AuditEntry, AuditSink};
use crate::claim::{Claim, ClaimStatus};
use crate::decision::Decision;
use crate::document::ClaimDocument;
use crate::duplicates::DuplicateMatch;
use crate::plan::{MemberPolicy, Plan};
use crate::rules::{ValidationResult, ValidationRule};

/// Query parameters for finding claims
///
/// Results are always ordered oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimQuery {
    /// Filter by claimant
    pub claimant_id: Option<UserId>,
    /// Keep only these statuses; empty keeps all
    pub statuses: Vec<ClaimStatus>,
    /// Drop these statuses
    pub exclude_statuses: Vec<ClaimStatus>,
    /// Drop this claim
    pub exclude_claim: Option<ClaimId>,
    /// Soft-deleted claims are skipped unless set
    pub include_deleted: bool,
    /// Limit results
    pub limit: Option<u32>,
}

impl ClaimQuery {
    /// The claimant's other live claims a duplicate could hide among
    pub fn duplicate_candidates(claim: &Claim) -> Self {
        Self {
            claimant_id: Some(claim.claimant_id),
            exclude_statuses: vec![ClaimStatus::Draft, ClaimStatus::Denied],
            exclude_claim: Some(claim.id),
            ..Default::default()
        }
    }

    /// Claims waiting for an agent
    pub fn review_queue() -> Self {
        Self {
            statuses: vec![ClaimStatus::PendingReview],
            ..Default::default()
        }
    }

    /// Claims filed by one claimant
    pub fn by_claimant(claimant_id: UserId) -> Self {
        Self {
            claimant_id: Some(claimant_id),
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-process evaluation of the predicate, limit aside
    pub fn matches(&self, claim: &Claim) -> bool {
        if let Some(claimant_id) = self.claimant_id {
            if claim.claimant_id != claimant_id {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&claim.status) {
            return false;
        }
        if self.exclude_statuses.contains(&claim.status) {
            return false;
        }
        if self.exclude_claim == Some(claim.id) {
            return false;
        }
        self.include_deleted || !claim.is_deleted()
    }
}

/// Precondition for a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// The claim must not exist yet
    New,
    /// The stored claim must still be at this status and version
    Current { status: ClaimStatus, version: i64 },
}

/// Everything one pipeline step writes, committed atomically
#[derive(Debug, Clone)]
pub struct ClaimCommit {
    pub claim: Claim,
    pub expected: Expected,
    pub decision: Option<Decision>,
    pub documents: Vec<ClaimDocument>,
    /// Inserted unless the pair is already recorded
    pub duplicate_matches: Vec<DuplicateMatch>,
    /// `Some` replaces the claim's stored results
    pub validation_results: Option<Vec<ValidationResult>>,
    pub audit: Vec<AuditEntry>,
}

impl ClaimCommit {
    /// Inserts a new claim
    pub fn insert(claim: Claim) -> Self {
        Self::with_expected(claim, Expected::New)
    }

    /// Updates a claim read earlier as `original`
    pub fn update(original: &Claim, claim: Claim) -> Self {
        Self::with_expected(
            claim,
            Expected::Current {
                status: original.status,
                version: original.version,
            },
        )
    }

    fn with_expected(claim: Claim, expected: Expected) -> Self {
        Self {
            claim,
            expected,
            decision: None,
            documents: Vec::new(),
            duplicate_matches: Vec::new(),
            validation_results: None,
            audit: Vec::new(),
        }
    }

    pub fn decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn document(mut self, document: ClaimDocument) -> Self {
        self.documents.push(document);
        self
    }

    pub fn duplicate_matches(mut self, matches: Vec<DuplicateMatch>) -> Self {
        self.duplicate_matches.extend(matches);
        self
    }

    pub fn validation_results(mut self, results: Vec<ValidationResult>) -> Self {
        self.validation_results = Some(results);
        self
    }

    pub fn audit(mut self, entry: AuditEntry) -> Self {
        self.audit.push(entry);
        self
    }

    /// Version the claim carries once this commit lands
    pub fn next_version(&self) -> i64 {
        match self.expected {
            Expected::New => self.claim.version,
            Expected::Current { version, .. } => version + 1,
        }
    }
}

/// Persistence port for the claims pipeline
#[async_trait]
pub trait ClaimStore: AuditSink {
    /// Loads a claim by id, soft-deleted ones included
    async fn get_claim(&self, id: ClaimId) -> Result<Claim, PortError>;

    /// Finds claims matching the query, oldest first
    async fn find_claims(&self, query: ClaimQuery) -> Result<Vec<Claim>, PortError>;

    async fn get_plan(&self, id: PlanId) -> Result<Option<Plan>, PortError>;

    /// Every policy the claimant holds on a plan, most recent start first
    async fn member_policies(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<Vec<MemberPolicy>, PortError>;

    /// Global rules plus rules scoped to `plan_id`, in storage order
    async fn rules_for(&self, plan_id: Option<PlanId>) -> Result<Vec<ValidationRule>, PortError>;

    async fn documents_for(&self, claim_id: ClaimId) -> Result<Vec<ClaimDocument>, PortError>;

    /// Oldest document with this content hash on a claim other than `excluding`
    async fn find_document_by_hash(
        &self,
        file_hash: &str,
        excluding: ClaimId,
    ) -> Result<Option<ClaimDocument>, PortError>;

    /// Duplicate matches recorded for a claim
    async fn matches_for(&self, claim_id: ClaimId) -> Result<Vec<DuplicateMatch>, PortError>;

    async fn decisions_for(&self, claim_id: ClaimId) -> Result<Vec<Decision>, PortError>;

    async fn validation_results_for(&self, claim_id: ClaimId) -> Result<Vec<ValidationResult>, PortError>;

    /// Atomically applies a commit
    ///
    /// Fails with `PortError::Conflict` when the precondition no longer
    /// holds, in which case nothing is written.
    async fn commit(&self, commit: ClaimCommit) -> Result<Claim, PortError>;
}

/// In-memory implementation of ClaimStore for testing
///
/// One lock guards all state so that a commit is atomic, as with the
/// database adapter's transaction.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use core_kernel::DomainPort;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    struct State {
        claims: HashMap<ClaimId, Claim>,
        plans: HashMap<PlanId, Plan>,
        policies: Vec<MemberPolicy>,
        rules: Vec<ValidationRule>,
        documents: Vec<ClaimDocument>,
        matches: Vec<DuplicateMatch>,
        decisions: Vec<Decision>,
        results: HashMap<ClaimId, Vec<ValidationResult>>,
        audit: Vec<AuditEntry>,
    }

    /// In-memory claim store
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryClaimStore {
        state: Arc<RwLock<State>>,
    }

    impl InMemoryClaimStore {
        /// Creates an empty store
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert_plan(&self, plan: Plan) {
            self.state.write().await.plans.insert(plan.id, plan);
        }

        pub async fn insert_member_policy(&self, policy: MemberPolicy) {
            self.state.write().await.policies.push(policy);
        }

        pub async fn insert_rule(&self, rule: ValidationRule) {
            self.state.write().await.rules.push(rule);
        }

        /// Stores a claim as-is, bypassing the pipeline
        pub async fn insert_claim(&self, claim: Claim) {
            self.state.write().await.claims.insert(claim.id, claim);
        }

        pub async fn audit_len(&self) -> usize {
            self.state.read().await.audit.len()
        }
    }

    impl DomainPort for InMemoryClaimStore {}

    #[async_trait]
    impl AuditSink for InMemoryClaimStore {
        async fn append(&self, entry: AuditEntry) -> Result<(), PortError> {
            self.state.write().await.audit.push(entry);
            Ok(())
        }

        async fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .audit
                .iter()
                .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl ClaimStore for InMemoryClaimStore {
        async fn get_claim(&self, id: ClaimId) -> Result<Claim, PortError> {
            self.state
                .read()
                .await
                .claims
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Claim", id))
        }

        async fn find_claims(&self, query: ClaimQuery) -> Result<Vec<Claim>, PortError> {
            let state = self.state.read().await;
            let mut results: Vec<Claim> = state
                .claims
                .values()
                .filter(|claim| query.matches(claim))
                .cloned()
                .collect();
            results.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

            if let Some(limit) = query.limit {
                results.truncate(limit as usize);
            }
            Ok(results)
        }

        async fn get_plan(&self, id: PlanId) -> Result<Option<Plan>, PortError> {
            Ok(self.state.read().await.plans.get(&id).cloned())
        }

        async fn member_policies(
            &self,
            user_id: UserId,
            plan_id: PlanId,
        ) -> Result<Vec<MemberPolicy>, PortError> {
            let mut policies: Vec<MemberPolicy> = self
                .state
                .read()
                .await
                .policies
                .iter()
                .filter(|p| p.user_id == user_id && p.plan_id == plan_id)
                .cloned()
                .collect();
            policies.sort_by(|a, b| b.start_date.cmp(&a.start_date));
            Ok(policies)
        }

        async fn rules_for(&self, plan_id: Option<PlanId>) -> Result<Vec<ValidationRule>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .rules
                .iter()
                .filter(|rule| rule.applies_to(plan_id))
                .cloned()
                .collect())
        }

        async fn documents_for(&self, claim_id: ClaimId) -> Result<Vec<ClaimDocument>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .documents
                .iter()
                .filter(|doc| doc.claim_id == claim_id)
                .cloned()
                .collect())
        }

        async fn find_document_by_hash(
            &self,
            file_hash: &str,
            excluding: ClaimId,
        ) -> Result<Option<ClaimDocument>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .documents
                .iter()
                .find(|doc| doc.file_hash == file_hash && doc.claim_id != excluding)
                .cloned())
        }

        async fn matches_for(&self, claim_id: ClaimId) -> Result<Vec<DuplicateMatch>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .matches
                .iter()
                .filter(|m| m.claim_id == claim_id)
                .cloned()
                .collect())
        }

        async fn decisions_for(&self, claim_id: ClaimId) -> Result<Vec<Decision>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .decisions
                .iter()
                .filter(|d| d.claim_id == claim_id)
                .cloned()
                .collect())
        }

        async fn validation_results_for(&self, claim_id: ClaimId) -> Result<Vec<ValidationResult>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .results
                .get(&claim_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn commit(&self, commit: ClaimCommit) -> Result<Claim, PortError> {
            let mut state = self.state.write().await;
            let claim_id = commit.claim.id;

            match (commit.expected, state.claims.get(&claim_id)) {
                (Expected::New, None) => {}
                (Expected::New, Some(_)) => {
                    return Err(PortError::conflict(format!("claim {claim_id} already exists")))
                }
                (Expected::Current { .. }, None) => return Err(PortError::not_found("Claim", claim_id)),
                (Expected::Current { status, version }, Some(stored)) => {
                    if stored.status != status || stored.version != version {
                        return Err(PortError::conflict(format!(
                            "claim {claim_id} changed concurrently (expected {status} v{version}, found {} v{})",
                            stored.status, stored.version
                        )));
                    }
                }
            }

            let mut claim = commit.claim.clone();
            claim.version = commit.next_version();
            state.claims.insert(claim_id, claim.clone());

            if let Some(decision) = commit.decision {
                state.decisions.push(decision);
            }
            state.documents.extend(commit.documents);
            for m in commit.duplicate_matches {
                let recorded = state.matches.iter().any(|existing| existing.pair() == m.pair());
                if !recorded {
                    state.matches.push(m);
                }
            }
            if let Some(results) = commit.validation_results {
                state.results.insert(claim_id, results);
            }
            state.audit.extend(commit.audit);

            Ok(claim)
        }
    }
}
