//! Claims domain services
//!
//! [`ClaimDecisionService`] orchestrates the pipeline: it loads a claim and
//! its reference data through the [`ClaimStore`] port, runs the pure
//! components (duplicate detection, rule engine, auto-approval evaluator,
//! state machine) and commits each step with one compare-and-set.
//!
//! ```rust,ignore
//! let service = ClaimDecisionService::new(store, EngineConfig::default())
//!     .with_extractor(extractor);
//!
//! let claim = service.create_claim(draft, &actor).await?;
//! service.submit(claim.id, &actor).await?;
//! service.intake_document(claim.id, upload, &actor).await?;
//! let outcome = service.process_claim(claim.id).await?;
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{ClaimId, UserId};

use crate::actor::{Actor, Role};
use crate::audit::{AuditAction, AuditEntry, CLAIM_ENTITY};
use crate::auto_approval::{AutoApprovalEvaluator, AutoApprovalInput, AutoApprovalVerdict};
use crate::claim::{Claim, ClaimStatus};
use crate::config::EngineConfig;
use crate::decision::{Decision, DecisionRequest, DecisionType};
use crate::document::{content_hash, ClaimDocument, DocumentUpload};
use crate::duplicates::{duplicate_score, DuplicateDetector, DuplicateMatch};
use crate::error::ClaimError;
use crate::extraction::{apply_extraction, Extraction, SharedExtractor};
use crate::plan::{MemberPolicy, Plan};
use crate::ports::{ClaimCommit, ClaimQuery, ClaimStore};
use crate::rules::{
    summarize, PolicyLookup, RuleEngine, RuleSet, ValidationContext, ValidationResult,
    ValidationSummary,
};
use crate::workflow::ClaimStateMachine;

/// Re-reads allowed when recording a late exact duplicate races another write
const EXACT_DUPLICATE_RETRIES: u32 = 3;

/// Where the pipeline sent a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    AutoApproved,
    PendingReview,
}

/// Result of [`ClaimDecisionService::process_claim`]
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub claim: Claim,
    pub routing: Routing,
    /// Absent when the claim had no extraction data to evaluate
    pub summary: Option<ValidationSummary>,
    pub verdict: Option<AutoApprovalVerdict>,
    /// The system decision of an auto-approved claim
    pub decision: Option<Decision>,
}

/// Result of [`ClaimDecisionService::intake_document`]
#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutcome {
    pub claim: Claim,
    pub document: ClaimDocument,
    /// The same file was already attached to this claim
    pub already_attached: bool,
    /// Claim holding an identical file, if any
    pub exact_duplicate_of: Option<ClaimId>,
    pub filled_fields: Vec<&'static str>,
}

/// Result of [`ClaimDecisionService::decide`]
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub claim: Claim,
    pub decision: Decision,
}

/// A persisted validation pass
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
    pub summary: ValidationSummary,
}

/// Plan, documents and policy a claim is evaluated against
struct ReferenceData {
    plan: Option<Plan>,
    documents: Vec<ClaimDocument>,
    policies: Result<Vec<MemberPolicy>, String>,
}

impl ReferenceData {
    fn policy_lookup(&self) -> PolicyLookup<'_> {
        match &self.policies {
            Ok(policies) if policies.is_empty() => PolicyLookup::Missing,
            Ok(policies) => PolicyLookup::Found(policies),
            Err(message) => PolicyLookup::Failed(message.clone()),
        }
    }
}

/// Duplicate detection output for one claim
struct DuplicateScan {
    new_matches: Vec<DuplicateMatch>,
    all_matches: Vec<DuplicateMatch>,
    score: f64,
}

/// Runs claims through validation, duplicate detection and routing
pub struct ClaimDecisionService {
    store: Arc<dyn ClaimStore>,
    engine: RuleEngine,
    evaluator: AutoApprovalEvaluator,
    config: EngineConfig,
    extractor: Option<SharedExtractor>,
}

impl ClaimDecisionService {
    /// Creates a service over a store
    pub fn new(store: Arc<dyn ClaimStore>, config: EngineConfig) -> Self {
        Self {
            store,
            engine: RuleEngine::new(&config),
            evaluator: AutoApprovalEvaluator::new(&config),
            config,
            extractor: None,
        }
    }

    /// Attaches the document extractor used at intake
    pub fn with_extractor(mut self, extractor: SharedExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn get_claim(&self, claim_id: ClaimId) -> Result<Claim, ClaimError> {
        Ok(self.store.get_claim(claim_id).await?)
    }

    /// Stores a new draft claim
    pub async fn create_claim(&self, draft: Claim, actor: &Actor) -> Result<Claim, ClaimError> {
        if draft.status != ClaimStatus::Draft {
            return Err(ClaimError::InvalidInput(format!(
                "new claims start as {}, got {}",
                ClaimStatus::Draft,
                draft.status
            )));
        }
        if draft.total_amount.amount().is_sign_negative() {
            return Err(ClaimError::InvalidInput("total amount cannot be negative".to_string()));
        }

        let audit = AuditEntry::for_claim(draft.id, AuditAction::Create, Some(actor.user_id)).with_after(json!({
            "status": draft.status,
            "claim_number": draft.claim_number,
            "total_amount": draft.total_amount.to_string(),
        }));

        let claim = self.commit(ClaimCommit::insert(draft).audit(audit)).await?;
        info!(claim_id = %claim.id, claim_number = %claim.claim_number, "Claim created");
        Ok(claim)
    }

    /// Submits a draft, or resubmits a pended claim
    pub async fn submit(&self, claim_id: ClaimId, actor: &Actor) -> Result<Claim, ClaimError> {
        let claim = self.live_claim(claim_id).await?;
        let transition = ClaimStateMachine::transition(&claim, ClaimStatus::Submitted, Some(actor.user_id))?;

        let committed = self
            .commit(ClaimCommit::update(&claim, transition.claim).audit(transition.audit))
            .await?;
        info!(claim_id = %claim_id, from = %claim.status, "Claim submitted");
        Ok(committed)
    }

    /// Attaches a document and applies what extraction reads off it
    ///
    /// Re-uploading a file already on the claim is a no-op. A file identical
    /// to one on another claim records an exact duplicate match and pins the
    /// duplicate score at 1.0. Extraction failures are logged and the document
    /// is stored without extracted data.
    pub async fn intake_document(
        &self,
        claim_id: ClaimId,
        upload: DocumentUpload,
        actor: &Actor,
    ) -> Result<IntakeOutcome, ClaimError> {
        let claim = self.live_claim(claim_id).await?;
        if claim.status.is_decided() {
            return Err(ClaimError::InvalidInput(format!(
                "claim {claim_id} is {} and no longer accepts documents",
                claim.status
            )));
        }

        let file_hash = content_hash(&upload.bytes);
        let documents = self.store.documents_for(claim_id).await?;
        if let Some(existing) = documents.iter().find(|doc| doc.file_hash == file_hash) {
            info!(claim_id = %claim_id, document_id = %existing.id, "Document already attached");
            return Ok(IntakeOutcome {
                claim,
                document: existing.clone(),
                already_attached: true,
                exact_duplicate_of: None,
                filled_fields: Vec::new(),
            });
        }

        let original = self.store.find_document_by_hash(&file_hash, claim_id).await?;
        let extraction = self.extract(&claim, &upload).await;

        let document = ClaimDocument::from_upload(
            claim_id,
            &upload,
            extraction.as_ref().and_then(|e| e.ocr_quality_score),
        );

        let mut next = claim.clone();
        next.updated_at = Utc::now();
        let filled_fields = match &extraction {
            Some(extraction) => apply_extraction(&mut next, extraction),
            None => Vec::new(),
        };

        let ocr_scores: Vec<f64> = documents
            .iter()
            .chain(std::iter::once(&document))
            .filter_map(|doc| doc.ocr_quality_score)
            .collect();
        if !ocr_scores.is_empty() {
            next.ocr_quality_score = Some(ocr_scores.iter().sum::<f64>() / ocr_scores.len() as f64);
        }

        let existing_matches = self.store.matches_for(claim_id).await?;
        let exact_duplicate_of = original.map(|doc| doc.claim_id);
        let new_matches = match exact_duplicate_of {
            Some(original_claim) => {
                warn!(
                    claim_id = %claim_id,
                    original_claim_id = %original_claim,
                    "Exact file duplicate detected"
                );
                DuplicateDetector::new_matches(
                    &existing_matches,
                    vec![DuplicateMatch::exact(claim_id, original_claim)],
                )
            }
            None => Vec::new(),
        };
        next.duplicate_score = duplicate_score(existing_matches.iter().chain(new_matches.iter()));

        let added = AuditEntry::for_claim(claim_id, AuditAction::DocumentAdded, Some(actor.user_id))
            .with_after(json!({
                "document_id": document.id,
                "file_name": document.file_name,
                "file_hash": document.file_hash,
                "document_type": document.document_type,
            }))
            .with_metadata(json!({
                "filled_fields": filled_fields,
                "exact_duplicate_of": exact_duplicate_of,
            }));

        let mut commit = ClaimCommit::update(&claim, next.clone())
            .document(document.clone())
            .duplicate_matches(new_matches)
            .audit(added);

        if extraction.is_some() && next.status == ClaimStatus::Submitted {
            let transition = ClaimStateMachine::transition(&next, ClaimStatus::Extracted, None)?;
            commit.claim = transition.claim;
            commit = commit.audit(transition.audit);
        }

        let committed = self.commit(commit).await?;
        let (committed, exact_duplicate_of) = match exact_duplicate_of {
            Some(original_claim) => (committed, Some(original_claim)),
            None => self.recheck_exact_duplicate(committed, &document.file_hash).await?,
        };
        info!(
            claim_id = %claim_id,
            document_id = %document.id,
            status = %committed.status,
            score = committed.duplicate_score,
            "Document attached"
        );

        Ok(IntakeOutcome {
            claim: committed,
            document,
            already_attached: false,
            exact_duplicate_of,
            filled_fields,
        })
    }

    /// Runs the full pipeline on a claim and commits the routing
    ///
    /// EXTRACTED claims are scored for duplicates and validated. Claims with
    /// error-severity failures go straight to PENDING_REVIEW; the rest pass
    /// through VALIDATED and are auto-approved when eligible. SUBMITTED claims
    /// without extraction data are routed to PENDING_REVIEW.
    pub async fn process_claim(&self, claim_id: ClaimId) -> Result<ProcessingOutcome, ClaimError> {
        let claim = self.live_claim(claim_id).await?;

        match claim.status {
            ClaimStatus::Submitted => return self.route_unextracted(claim).await,
            ClaimStatus::Extracted => {}
            other => {
                return Err(ClaimError::IllegalTransition {
                    from: other,
                    to: ClaimStatus::Validated,
                })
            }
        }

        let reference = self.reference_data(&claim).await?;
        let scan = self.scan_duplicates(&claim, reference.plan.as_ref()).await?;

        let mut next = claim.clone();
        next.duplicate_score = scan.score;

        let results = self.run_rules(&next, &reference).await?;
        let summary = summarize(&results);
        let verdict = self.evaluator.evaluate(&AutoApprovalInput {
            claim: &next,
            plan: reference.plan.as_ref(),
            documents: &reference.documents,
            summary: &summary,
        });

        next.auto_approval_eligible = verdict.eligible;
        next.auto_approval_reasons = verdict.reasons().to_vec();

        let mut audit = Vec::new();
        let mut step = |claim: &Claim, target: ClaimStatus| -> Result<Claim, ClaimError> {
            let transition = ClaimStateMachine::transition(claim, target, None)?;
            audit.push(transition.audit);
            Ok(transition.claim)
        };

        let (routing, decision) = if !summary.is_valid {
            next = step(&next, ClaimStatus::PendingReview)?;
            (Routing::PendingReview, None)
        } else {
            next = step(&next, ClaimStatus::Validated)?;
            if verdict.eligible {
                next = step(&next, ClaimStatus::AutoApproved)?;
                next.approved_amount = Some(next.total_amount);
                (Routing::AutoApproved, Some(Decision::auto_approval(&next, verdict.passed.clone())))
            } else {
                next = step(&next, ClaimStatus::PendingReview)?;
                (Routing::PendingReview, None)
            }
        };

        let routed = match routing {
            Routing::AutoApproved => AuditEntry::for_claim(claim_id, AuditAction::AutoApprove, None).with_after(json!({
                "approved_amount": next.total_amount.to_string(),
                "reasons": verdict.passed,
            })),
            Routing::PendingReview => {
                AuditEntry::for_claim(claim_id, AuditAction::RouteToReview, None).with_metadata(json!({
                    "reasons": verdict.failures,
                    "validation_errors": summary.errors,
                }))
            }
        };
        audit.push(routed);

        let mut commit = ClaimCommit::update(&claim, next)
            .duplicate_matches(scan.new_matches)
            .validation_results(results);
        if let Some(decision) = decision.clone() {
            commit = commit.decision(decision);
        }
        for entry in audit {
            commit = commit.audit(entry);
        }

        let committed = self.commit(commit).await?;
        info!(
            claim_id = %claim_id,
            routing = ?routing,
            score = committed.duplicate_score,
            errors = summary.errors,
            "Claim processed"
        );

        Ok(ProcessingOutcome {
            claim: committed,
            routing,
            summary: Some(summary),
            verdict: Some(verdict),
            decision,
        })
    }

    async fn route_unextracted(&self, claim: Claim) -> Result<ProcessingOutcome, ClaimError> {
        let reason = "Extraction data unavailable".to_string();
        let transition = ClaimStateMachine::transition(&claim, ClaimStatus::PendingReview, None)?;

        let mut next = transition.claim;
        next.auto_approval_eligible = false;
        next.auto_approval_reasons = vec![reason.clone()];

        let routed = AuditEntry::for_claim(claim.id, AuditAction::RouteToReview, None)
            .with_metadata(json!({ "reasons": [reason] }));

        let committed = self
            .commit(ClaimCommit::update(&claim, next).audit(transition.audit).audit(routed))
            .await?;
        info!(claim_id = %claim.id, "Claim without extraction routed to review");

        Ok(ProcessingOutcome {
            claim: committed,
            routing: Routing::PendingReview,
            summary: None,
            verdict: None,
            decision: None,
        })
    }

    /// Records an agent's decision on a claim
    pub async fn decide(
        &self,
        claim_id: ClaimId,
        request: DecisionRequest,
        actor: &Actor,
    ) -> Result<DecisionOutcome, ClaimError> {
        if !actor.can_decide() {
            return Err(ClaimError::Forbidden(format!(
                "user {} may not decide claims",
                actor.user_id
            )));
        }
        let claim = self.live_claim(claim_id).await?;
        self.decide_claim(&claim, request, actor).await
    }

    /// Decides against a snapshot read earlier
    ///
    /// The commit only lands if the claim is still at the snapshot's status
    /// and version; otherwise it fails with [`ClaimError::Conflict`] and
    /// nothing is written.
    pub async fn decide_claim(
        &self,
        snapshot: &Claim,
        request: DecisionRequest,
        actor: &Actor,
    ) -> Result<DecisionOutcome, ClaimError> {
        if !actor.can_decide() {
            return Err(ClaimError::Forbidden(format!(
                "user {} may not decide claims",
                actor.user_id
            )));
        }
        if let Some(amount) = request.approved_amount {
            if amount.currency() != snapshot.currency() {
                return Err(ClaimError::InvalidInput(format!(
                    "approved amount currency {} does not match claim currency {}",
                    amount.currency(),
                    snapshot.currency()
                )));
            }
            if amount.amount().is_sign_negative() {
                return Err(ClaimError::InvalidInput("approved amount cannot be negative".to_string()));
            }
        }

        let transition = ClaimStateMachine::transition(snapshot, request.decision.target_status(), Some(actor.user_id))?
            .with_notes(request.notes.as_deref());
        let decision = Decision::human(snapshot, &request, actor.user_id);

        let mut next = transition.claim;
        if request.decision == DecisionType::Approved {
            next.approved_amount = decision.approved_amount;
        }

        let recorded = AuditEntry::for_claim(snapshot.id, AuditAction::Decision, Some(actor.user_id)).with_after(json!({
            "decision": decision.decision,
            "approved_amount": decision.approved_amount.map(|m| m.to_string()),
            "reason_code": decision.reason_code,
        }));

        let committed = self
            .commit(
                ClaimCommit::update(snapshot, next)
                    .decision(decision.clone())
                    .audit(transition.audit)
                    .audit(recorded),
            )
            .await?;
        info!(
            claim_id = %snapshot.id,
            decision = %decision.decision,
            decided_by = %actor.user_id,
            "Claim decided"
        );

        Ok(DecisionOutcome {
            claim: committed,
            decision,
        })
    }

    /// Closes a decided claim
    pub async fn close(&self, claim_id: ClaimId, actor: &Actor) -> Result<Claim, ClaimError> {
        self.require_staff(actor, "close claims")?;
        let claim = self.live_claim(claim_id).await?;
        let transition = ClaimStateMachine::transition(&claim, ClaimStatus::Closed, Some(actor.user_id))?;

        let committed = self
            .commit(ClaimCommit::update(&claim, transition.claim).audit(transition.audit))
            .await?;
        info!(claim_id = %claim_id, "Claim closed");
        Ok(committed)
    }

    /// Assigns the claim to an agent
    pub async fn assign(&self, claim_id: ClaimId, agent_id: UserId, actor: &Actor) -> Result<Claim, ClaimError> {
        self.require_staff(actor, "assign claims")?;
        let claim = self.live_claim(claim_id).await?;

        let mut next = claim.clone();
        next.assigned_agent_id = Some(agent_id);
        next.updated_at = Utc::now();

        let audit = AuditEntry::for_claim(claim_id, AuditAction::Assign, Some(actor.user_id))
            .with_before(json!({ "assigned_agent_id": claim.assigned_agent_id }))
            .with_after(json!({ "assigned_agent_id": agent_id }));

        let committed = self.commit(ClaimCommit::update(&claim, next).audit(audit)).await?;
        info!(claim_id = %claim_id, agent_id = %agent_id, "Claim assigned");
        Ok(committed)
    }

    /// Soft-deletes an undecided claim
    ///
    /// Only the claimant or an admin may delete. Deleting twice is a no-op.
    pub async fn soft_delete(&self, claim_id: ClaimId, actor: &Actor) -> Result<Claim, ClaimError> {
        let claim = self.store.get_claim(claim_id).await?;
        if actor.user_id != claim.claimant_id && !actor.has_role(Role::Admin) {
            return Err(ClaimError::Forbidden(format!(
                "user {} may not delete claim {claim_id}",
                actor.user_id
            )));
        }
        if claim.is_deleted() {
            return Ok(claim);
        }
        if claim.status.is_decided() {
            return Err(ClaimError::InvalidInput(format!(
                "claim {claim_id} is {} and cannot be deleted",
                claim.status
            )));
        }

        let now = Utc::now();
        let mut next = claim.clone();
        next.deleted_at = Some(now);
        next.updated_at = now;

        let audit = AuditEntry::for_claim(claim_id, AuditAction::SoftDelete, Some(actor.user_id))
            .with_before(json!({ "status": claim.status }))
            .with_after(json!({ "deleted_at": now }));

        let committed = self.commit(ClaimCommit::update(&claim, next).audit(audit)).await?;
        info!(claim_id = %claim_id, "Claim soft-deleted");
        Ok(committed)
    }

    /// Claims waiting for an agent, oldest first
    pub async fn review_queue(&self, limit: Option<u32>) -> Result<Vec<Claim>, ClaimError> {
        let mut query = ClaimQuery::review_queue();
        query.limit = limit;
        Ok(self.store.find_claims(query).await?)
    }

    /// Audit trail of a claim, oldest first
    pub async fn timeline(&self, claim_id: ClaimId) -> Result<Vec<AuditEntry>, ClaimError> {
        Ok(self
            .store
            .entries_for(CLAIM_ENTITY, &claim_id.to_string())
            .await?)
    }

    /// Validates a claim and replaces its stored results
    pub async fn validate(&self, claim_id: ClaimId) -> Result<ValidationReport, ClaimError> {
        let claim = self.live_claim(claim_id).await?;
        let reference = self.reference_data(&claim).await?;
        let results = self.run_rules(&claim, &reference).await?;
        let summary = summarize(&results);

        let mut next = claim.clone();
        next.updated_at = Utc::now();
        self.commit(ClaimCommit::update(&claim, next).validation_results(results.clone()))
            .await?;
        info!(
            claim_id = %claim_id,
            passed = summary.passed,
            failed = summary.failed,
            "Claim validated"
        );

        Ok(ValidationReport { results, summary })
    }

    /// Scores the claim against the claimant's other claims
    ///
    /// New matches are recorded and the claim's duplicate score is reset to
    /// the highest similarity among all of its matches. Returns every match.
    pub async fn find_duplicates(&self, claim_id: ClaimId) -> Result<Vec<DuplicateMatch>, ClaimError> {
        let claim = self.live_claim(claim_id).await?;
        let plan = match claim.plan_id {
            Some(plan_id) => self.store.get_plan(plan_id).await?,
            None => None,
        };
        let scan = self.scan_duplicates(&claim, plan.as_ref()).await?;

        if scan.new_matches.is_empty() && scan.score == claim.duplicate_score {
            return Ok(scan.all_matches);
        }

        let mut next = claim.clone();
        next.duplicate_score = scan.score;
        next.updated_at = Utc::now();
        self.commit(ClaimCommit::update(&claim, next).duplicate_matches(scan.new_matches))
            .await?;
        info!(claim_id = %claim_id, score = scan.score, matches = scan.all_matches.len(), "Duplicates scored");

        Ok(scan.all_matches)
    }

    /// Eligibility verdict for the claim as stored; writes nothing
    pub async fn evaluate_auto_approval(&self, claim_id: ClaimId) -> Result<AutoApprovalVerdict, ClaimError> {
        let claim = self.store.get_claim(claim_id).await?;
        let reference = self.reference_data(&claim).await?;
        let results = self.run_rules(&claim, &reference).await?;
        let summary = summarize(&results);

        Ok(self.evaluator.evaluate(&AutoApprovalInput {
            claim: &claim,
            plan: reference.plan.as_ref(),
            documents: &reference.documents,
            summary: &summary,
        }))
    }

    /// Moves a claim along the status graph without a decision
    ///
    /// Statuses that carry a decision (approved, denied, pended,
    /// auto-approved) are reached through [`Self::decide`] and
    /// [`Self::process_claim`] only.
    pub async fn transition_status(
        &self,
        claim_id: ClaimId,
        target: ClaimStatus,
        actor: &Actor,
        notes: Option<&str>,
    ) -> Result<Claim, ClaimError> {
        if matches!(
            target,
            ClaimStatus::Approved | ClaimStatus::Denied | ClaimStatus::Pended | ClaimStatus::AutoApproved
        ) {
            return Err(ClaimError::InvalidInput(format!(
                "{target} requires a decision"
            )));
        }
        if target != ClaimStatus::Submitted {
            self.require_staff(actor, "change claim status")?;
        }

        let claim = self.live_claim(claim_id).await?;
        let transition = ClaimStateMachine::transition(&claim, target, Some(actor.user_id))?.with_notes(notes);

        let committed = self
            .commit(ClaimCommit::update(&claim, transition.claim).audit(transition.audit))
            .await?;
        info!(claim_id = %claim_id, from = %claim.status, to = %target, "Claim status changed");
        Ok(committed)
    }

    async fn live_claim(&self, claim_id: ClaimId) -> Result<Claim, ClaimError> {
        let claim = self.store.get_claim(claim_id).await?;
        if claim.is_deleted() {
            return Err(ClaimError::NotFound {
                entity_type: "Claim".to_string(),
                id: claim_id.to_string(),
            });
        }
        Ok(claim)
    }

    fn require_staff(&self, actor: &Actor, what: &str) -> Result<(), ClaimError> {
        if actor.can_decide() {
            Ok(())
        } else {
            Err(ClaimError::Forbidden(format!("user {} may not {what}", actor.user_id)))
        }
    }

    async fn extract(&self, claim: &Claim, upload: &DocumentUpload) -> Option<Extraction> {
        let extractor = self.extractor.as_ref()?;
        if !upload.is_extractable() {
            return None;
        }
        match extractor.extract(upload).await {
            Ok(extraction) => Some(extraction),
            Err(err) => {
                warn!(claim_id = %claim.id, file_name = %upload.file_name, error = %err, "Extraction failed");
                None
            }
        }
    }

    async fn reference_data(&self, claim: &Claim) -> Result<ReferenceData, ClaimError> {
        let (plan, policies) = match claim.plan_id {
            Some(plan_id) => {
                let plan = self.store.get_plan(plan_id).await?;
                let policies = self
                    .store
                    .member_policies(claim.claimant_id, plan_id)
                    .await
                    .map_err(|err| err.to_string());
                (plan, policies)
            }
            None => (None, Ok(Vec::new())),
        };
        let documents = self.store.documents_for(claim.id).await?;

        Ok(ReferenceData {
            plan,
            documents,
            policies,
        })
    }

    async fn run_rules(&self, claim: &Claim, reference: &ReferenceData) -> Result<Vec<ValidationResult>, ClaimError> {
        let rules = self.store.rules_for(claim.plan_id).await?;
        let rule_set = RuleSet::compile(rules, claim.plan_id);

        let ctx = ValidationContext {
            claim,
            documents: &reference.documents,
            plan: reference.plan.as_ref(),
            policy: reference.policy_lookup(),
            today: Utc::now().date_naive(),
        };
        Ok(self.engine.validate(&ctx, &rule_set))
    }

    async fn scan_duplicates(&self, claim: &Claim, plan: Option<&Plan>) -> Result<DuplicateScan, ClaimError> {
        let threshold = plan
            .map(|plan| plan.duplicate_match_threshold)
            .unwrap_or(self.config.duplicate_match_threshold);

        let pool = self.store.find_claims(ClaimQuery::duplicate_candidates(claim)).await?;
        let found = DuplicateDetector::find_duplicates(claim, &pool, threshold);
        let existing = self.store.matches_for(claim.id).await?;
        let new_matches = DuplicateDetector::new_matches(&existing, found);

        let mut all_matches = existing;
        all_matches.extend(new_matches.iter().cloned());
        let score = duplicate_score(&all_matches);

        Ok(DuplicateScan {
            new_matches,
            all_matches,
            score,
        })
    }

    /// Looks for the file on other claims again once the document is stored
    ///
    /// The lookup before the commit can miss an identical upload on another
    /// claim that commits concurrently. Whichever of the two looks last sees
    /// the other, so at least one of them records the exact match.
    async fn recheck_exact_duplicate(
        &self,
        claim: Claim,
        file_hash: &str,
    ) -> Result<(Claim, Option<ClaimId>), ClaimError> {
        let Some(original) = self.store.find_document_by_hash(file_hash, claim.id).await? else {
            return Ok((claim, None));
        };
        let original_claim = original.claim_id;
        warn!(
            claim_id = %claim.id,
            original_claim_id = %original_claim,
            "Exact file duplicate detected after commit"
        );

        let mut current = claim;
        let mut attempts = 0;
        loop {
            let existing = self.store.matches_for(current.id).await?;
            let new_matches = DuplicateDetector::new_matches(
                &existing,
                vec![DuplicateMatch::exact(current.id, original_claim)],
            );
            if new_matches.is_empty() && current.duplicate_score >= 1.0 {
                return Ok((current, Some(original_claim)));
            }

            let mut next = current.clone();
            next.duplicate_score = 1.0;
            next.updated_at = Utc::now();
            let commit = ClaimCommit::update(&current, next).duplicate_matches(new_matches);
            match self.commit(commit).await {
                Ok(updated) => return Ok((updated, Some(original_claim))),
                Err(err) if err.is_conflict() && attempts < EXACT_DUPLICATE_RETRIES => {
                    attempts += 1;
                    current = self.store.get_claim(current.id).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn commit(&self, commit: ClaimCommit) -> Result<Claim, ClaimError> {
        let claim_id = commit.claim.id;
        self.store.commit(commit).await.map_err(|err| {
            let err = ClaimError::from(err);
            if err.is_conflict() {
                warn!(claim_id = %claim_id, error = %err, "Claim commit lost a concurrent update");
            }
            err
        })
    }
}
