//! PostgreSQL Claim Store Adapter
//!
//! Implements the `ClaimStore` and `AuditSink` ports on top of
//! [`ClaimsRepository`] and [`ReferenceRepository`]. The adapter converts
//! between domain types and row types; the repositories own the SQL.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool_from_url, PgClaimStore};
//! use domain_claims::{ClaimDecisionService, ClaimStore, EngineConfig};
//! use std::sync::Arc;
//!
//! let pool = create_pool_from_url("postgres://localhost/claims").await?;
//! let store: Arc<dyn ClaimStore> = Arc::new(PgClaimStore::new(pool));
//! let service = ClaimDecisionService::new(store, EngineConfig::default());
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::str::FromStr;
use tracing::{debug, instrument};

use core_kernel::{
    AuditEntryId, ClaimId, Currency, DecisionId, DocumentId, DomainPort, DuplicateMatchId,
    MemberPolicyId, Money, PlanId, PortError, RuleId, UserId,
};
use domain_claims::ports::Expected;
use domain_claims::{
    AuditAction, AuditEntry, AuditSink, Claim, ClaimCategory, ClaimCommit, ClaimDocument,
    ClaimQuery, ClaimStatus, ClaimStore, Decision, DecisionType, DuplicateMatch, MemberPolicy,
    Plan, PolicyStatus, Severity, ValidationResult, ValidationRule,
};

use crate::error::DatabaseError;
use crate::repositories::claims::{
    AuditRow, ClaimFilter, ClaimRow, ClaimsRepository, CommitRows, DecisionRow, DocumentRow,
    DuplicateMatchRow, ValidationResultRow,
};
use crate::repositories::reference::{MemberPolicyRow, PlanRow, ReferenceRepository, RuleRow};

/// PostgreSQL-backed implementation of the ClaimStore port
///
/// Database errors are translated to `PortError` variants:
/// - `DatabaseError::NotFound` -> `PortError::NotFound`
/// - `DatabaseError::Conflict` -> `PortError::Conflict`
/// - Other errors -> `PortError::Internal`
#[derive(Debug, Clone)]
pub struct PgClaimStore {
    claims: ClaimsRepository,
    reference: ReferenceRepository,
}

impl PgClaimStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            claims: ClaimsRepository::new(pool.clone()),
            reference: ReferenceRepository::new(pool),
        }
    }

    /// Stores a plan
    pub async fn insert_plan(&self, plan: &Plan) -> Result<(), PortError> {
        self.reference.insert_plan(&plan_to_row(plan)).await?;
        Ok(())
    }

    /// Stores a member's enrolment
    pub async fn insert_member_policy(&self, policy: &MemberPolicy) -> Result<(), PortError> {
        self.reference
            .insert_member_policy(&member_policy_to_row(policy))
            .await?;
        Ok(())
    }

    /// Stores a validation rule
    pub async fn insert_rule(&self, rule: &ValidationRule) -> Result<(), PortError> {
        self.reference.insert_rule(&rule_to_row(rule)).await?;
        Ok(())
    }
}

impl DomainPort for PgClaimStore {}

#[async_trait]
impl AuditSink for PgClaimStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), PortError> {
        self.claims.append_audit(&audit_to_row(&entry)).await?;
        Ok(())
    }

    async fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>, PortError> {
        let rows = self.claims.audit_for(entity_type, entity_id).await?;
        collect(rows, row_to_audit)
    }
}

#[async_trait]
impl ClaimStore for PgClaimStore {
    #[instrument(skip(self), fields(claim_id = %id))]
    async fn get_claim(&self, id: ClaimId) -> Result<Claim, PortError> {
        let row = self.claims.get_by_id(*id.as_uuid()).await?;
        Ok(row_to_claim(row)?)
    }

    async fn find_claims(&self, query: ClaimQuery) -> Result<Vec<Claim>, PortError> {
        let filter = ClaimFilter {
            claimant_id: query.claimant_id.map(Into::into),
            statuses: status_codes(&query.statuses),
            exclude_statuses: status_codes(&query.exclude_statuses),
            exclude_claim: query.exclude_claim.map(Into::into),
            include_deleted: query.include_deleted,
            limit: query.limit.map(i64::from),
        };
        let rows = self.claims.find(&filter).await?;
        collect(rows, row_to_claim)
    }

    async fn get_plan(&self, id: PlanId) -> Result<Option<Plan>, PortError> {
        let row = self.reference.get_plan(*id.as_uuid()).await?;
        Ok(row.map(row_to_plan).transpose()?)
    }

    async fn member_policies(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<Vec<MemberPolicy>, PortError> {
        let rows = self
            .reference
            .member_policies(*user_id.as_uuid(), *plan_id.as_uuid())
            .await?;
        collect(rows, row_to_member_policy)
    }

    async fn rules_for(&self, plan_id: Option<PlanId>) -> Result<Vec<ValidationRule>, PortError> {
        let rows = self.reference.rules_for(plan_id.map(Into::into)).await?;
        collect(rows, row_to_rule)
    }

    async fn documents_for(&self, claim_id: ClaimId) -> Result<Vec<ClaimDocument>, PortError> {
        let rows = self.claims.documents_for(*claim_id.as_uuid()).await?;
        Ok(rows.into_iter().map(row_to_document).collect())
    }

    async fn find_document_by_hash(
        &self,
        file_hash: &str,
        excluding: ClaimId,
    ) -> Result<Option<ClaimDocument>, PortError> {
        let row = self
            .claims
            .find_document_by_hash(file_hash, *excluding.as_uuid())
            .await?;
        Ok(row.map(row_to_document))
    }

    async fn matches_for(&self, claim_id: ClaimId) -> Result<Vec<DuplicateMatch>, PortError> {
        let rows = self.claims.matches_for(*claim_id.as_uuid()).await?;
        Ok(rows.into_iter().map(row_to_match).collect())
    }

    async fn decisions_for(&self, claim_id: ClaimId) -> Result<Vec<Decision>, PortError> {
        let rows = self.claims.decisions_for(*claim_id.as_uuid()).await?;
        collect(rows, row_to_decision)
    }

    async fn validation_results_for(&self, claim_id: ClaimId) -> Result<Vec<ValidationResult>, PortError> {
        let rows = self.claims.validation_results_for(*claim_id.as_uuid()).await?;
        collect(rows, row_to_validation_result)
    }

    #[instrument(skip(self, commit), fields(claim_id = %commit.claim.id))]
    async fn commit(&self, commit: ClaimCommit) -> Result<Claim, PortError> {
        let mut claim = commit.claim.clone();
        claim.version = commit.next_version();

        let rows = CommitRows {
            claim: claim_to_row(&claim),
            expected: match commit.expected {
                Expected::New => None,
                Expected::Current { status, version } => Some((status.as_str().to_string(), version)),
            },
            decision: commit.decision.as_ref().map(decision_to_row),
            documents: commit.documents.iter().map(document_to_row).collect(),
            duplicate_matches: commit.duplicate_matches.iter().map(match_to_row).collect(),
            validation_results: commit.validation_results.as_ref().map(|results| {
                results
                    .iter()
                    .enumerate()
                    .map(|(position, result)| validation_result_to_row(position, result))
                    .collect()
            }),
            audit: commit.audit.iter().map(audit_to_row).collect(),
        };

        self.claims.apply(rows).await?;
        debug!(version = claim.version, status = %claim.status, "Claim committed");
        Ok(claim)
    }
}

// ============================================================================
// Row conversion helpers
// ============================================================================

fn collect<R, T>(rows: Vec<R>, convert: fn(R) -> Result<T, DatabaseError>) -> Result<Vec<T>, PortError> {
    rows.into_iter()
        .map(convert)
        .collect::<Result<Vec<_>, _>>()
        .map_err(PortError::from)
}

fn status_codes(statuses: &[ClaimStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn parse<T>(column: &str, value: &str) -> Result<T, DatabaseError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| DatabaseError::corrupt(column, e))
}

fn money(column: &str, amount: rust_decimal::Decimal, currency: &str) -> Result<Money, DatabaseError> {
    let currency: Currency = parse(column, currency)?;
    Ok(Money::new(amount, currency))
}

fn row_to_claim(row: ClaimRow) -> Result<Claim, DatabaseError> {
    let total_amount = money("currency", row.total_amount, &row.currency)?;
    let approved_amount = row
        .approved_amount
        .map(|amount| money("currency", amount, &row.currency))
        .transpose()?;

    Ok(Claim {
        id: ClaimId::from(row.claim_id),
        claim_number: row.claim_number,
        claimant_id: UserId::from(row.claimant_id),
        plan_id: row.plan_id.map(PlanId::from),
        assigned_agent_id: row.assigned_agent_id.map(UserId::from),
        status: parse::<ClaimStatus>("status", &row.status)?,
        category: parse::<ClaimCategory>("category", &row.category)?,
        total_amount,
        approved_amount,
        service_date: row.service_date,
        provider_name: row.provider_name,
        provider_npi: row.provider_npi,
        provider_type: row.provider_type,
        diagnosis_codes: row.diagnosis_codes,
        procedure_codes: row.procedure_codes,
        description: row.description,
        ocr_quality_score: row.ocr_quality_score,
        extraction_confidence: row.extraction_confidence,
        duplicate_score: row.duplicate_score,
        fraud_risk_score: row.fraud_risk_score,
        auto_approval_eligible: row.auto_approval_eligible,
        auto_approval_reasons: row.auto_approval_reasons,
        created_at: row.created_at,
        updated_at: row.updated_at,
        submitted_at: row.submitted_at,
        processed_at: row.processed_at,
        deleted_at: row.deleted_at,
        version: row.version,
    })
}

fn claim_to_row(claim: &Claim) -> ClaimRow {
    ClaimRow {
        claim_id: claim.id.into(),
        claim_number: claim.claim_number.clone(),
        claimant_id: claim.claimant_id.into(),
        plan_id: claim.plan_id.map(Into::into),
        assigned_agent_id: claim.assigned_agent_id.map(Into::into),
        status: claim.status.as_str().to_string(),
        category: claim.category.as_str().to_string(),
        total_amount: claim.total_amount.amount(),
        approved_amount: claim.approved_amount.map(|m| m.amount()),
        currency: claim.total_amount.currency().code().to_string(),
        service_date: claim.service_date,
        provider_name: claim.provider_name.clone(),
        provider_npi: claim.provider_npi.clone(),
        provider_type: claim.provider_type.clone(),
        diagnosis_codes: claim.diagnosis_codes.clone(),
        procedure_codes: claim.procedure_codes.clone(),
        description: claim.description.clone(),
        ocr_quality_score: claim.ocr_quality_score,
        extraction_confidence: claim.extraction_confidence,
        duplicate_score: claim.duplicate_score,
        fraud_risk_score: claim.fraud_risk_score,
        auto_approval_eligible: claim.auto_approval_eligible,
        auto_approval_reasons: claim.auto_approval_reasons.clone(),
        created_at: claim.created_at,
        updated_at: claim.updated_at,
        submitted_at: claim.submitted_at,
        processed_at: claim.processed_at,
        deleted_at: claim.deleted_at,
        version: claim.version,
    }
}

fn row_to_document(row: DocumentRow) -> ClaimDocument {
    ClaimDocument {
        id: DocumentId::from(row.document_id),
        claim_id: ClaimId::from(row.claim_id),
        file_name: row.file_name,
        content_type: row.content_type,
        file_size: row.file_size,
        file_hash: row.file_hash,
        document_type: row.document_type,
        ocr_quality_score: row.ocr_quality_score,
        created_at: row.created_at,
    }
}

fn document_to_row(document: &ClaimDocument) -> DocumentRow {
    DocumentRow {
        document_id: document.id.into(),
        claim_id: document.claim_id.into(),
        file_name: document.file_name.clone(),
        content_type: document.content_type.clone(),
        file_size: document.file_size,
        file_hash: document.file_hash.clone(),
        document_type: document.document_type.clone(),
        ocr_quality_score: document.ocr_quality_score,
        created_at: document.created_at,
    }
}

fn row_to_match(row: DuplicateMatchRow) -> DuplicateMatch {
    DuplicateMatch {
        id: DuplicateMatchId::from(row.match_id),
        claim_id: ClaimId::from(row.claim_id),
        matched_claim_id: ClaimId::from(row.matched_claim_id),
        similarity_score: row.similarity_score,
        reasons: row.reasons,
        created_at: row.created_at,
    }
}

fn match_to_row(found: &DuplicateMatch) -> DuplicateMatchRow {
    DuplicateMatchRow {
        match_id: found.id.into(),
        claim_id: found.claim_id.into(),
        matched_claim_id: found.matched_claim_id.into(),
        similarity_score: found.similarity_score,
        reasons: found.reasons.clone(),
        created_at: found.created_at,
    }
}

fn row_to_decision(row: DecisionRow) -> Result<Decision, DatabaseError> {
    let approved_amount = match (row.approved_amount, row.currency.as_deref()) {
        (Some(amount), Some(currency)) => Some(money("currency", amount, currency)?),
        (Some(_), None) => {
            return Err(DatabaseError::corrupt("currency", "approved amount without currency"))
        }
        (None, _) => None,
    };

    Ok(Decision {
        id: DecisionId::from(row.decision_id),
        claim_id: ClaimId::from(row.claim_id),
        decision: parse::<DecisionType>("decision", &row.decision)?,
        is_auto_decision: row.is_auto_decision,
        approved_amount,
        reason_code: row.reason_code,
        reason_description: row.reason_description,
        notes: row.notes,
        reasons: row.reasons,
        decided_by: row.decided_by.map(UserId::from),
        created_at: row.created_at,
    })
}

fn decision_to_row(decision: &Decision) -> DecisionRow {
    DecisionRow {
        decision_id: decision.id.into(),
        claim_id: decision.claim_id.into(),
        decision: decision.decision.as_str().to_string(),
        is_auto_decision: decision.is_auto_decision,
        approved_amount: decision.approved_amount.map(|m| m.amount()),
        currency: decision.approved_amount.map(|m| m.currency().code().to_string()),
        reason_code: decision.reason_code.clone(),
        reason_description: decision.reason_description.clone(),
        notes: decision.notes.clone(),
        reasons: decision.reasons.clone(),
        decided_by: decision.decided_by.map(Into::into),
        created_at: decision.created_at,
    }
}

fn row_to_validation_result(row: ValidationResultRow) -> Result<ValidationResult, DatabaseError> {
    Ok(ValidationResult {
        claim_id: ClaimId::from(row.claim_id),
        rule_id: RuleId::from(row.rule_id),
        rule_name: row.rule_name,
        passed: row.passed,
        severity: parse::<Severity>("severity", &row.severity)?,
        message: row.message,
        details: row.details,
        created_at: row.created_at,
    })
}

fn validation_result_to_row(position: usize, result: &ValidationResult) -> ValidationResultRow {
    ValidationResultRow {
        claim_id: result.claim_id.into(),
        position: i32::try_from(position).unwrap_or(i32::MAX),
        rule_id: result.rule_id.into(),
        rule_name: result.rule_name.clone(),
        passed: result.passed,
        severity: result.severity.as_str().to_string(),
        message: result.message.clone(),
        details: result.details.clone(),
        created_at: result.created_at,
    }
}

fn row_to_audit(row: AuditRow) -> Result<AuditEntry, DatabaseError> {
    Ok(AuditEntry {
        id: AuditEntryId::from(row.audit_id),
        entity_type: row.entity_type,
        entity_id: row.entity_id,
        action: parse::<AuditAction>("action", &row.action)?,
        actor_id: row.actor_id.map(UserId::from),
        before: row.before_state,
        after: row.after_state,
        metadata: row.metadata,
        created_at: row.created_at,
    })
}

fn audit_to_row(entry: &AuditEntry) -> AuditRow {
    AuditRow {
        audit_id: entry.id.into(),
        entity_type: entry.entity_type.clone(),
        entity_id: entry.entity_id.clone(),
        action: entry.action.as_str().to_string(),
        actor_id: entry.actor_id.map(Into::into),
        before_state: entry.before.clone(),
        after_state: entry.after.clone(),
        metadata: entry.metadata.clone(),
        created_at: entry.created_at,
    }
}

fn row_to_plan(row: PlanRow) -> Result<Plan, DatabaseError> {
    Ok(Plan {
        id: PlanId::from(row.plan_id),
        name: row.name,
        is_active: row.is_active,
        auto_approve_enabled: row.auto_approve_enabled,
        auto_approve_amount_cap: money("currency", row.auto_approve_amount_cap, &row.currency)?,
        min_ocr_quality_score: row.min_ocr_quality_score,
        min_confidence_score: row.min_confidence_score,
        max_duplicate_score: row.max_duplicate_score,
        max_fraud_risk_score: row.max_fraud_risk_score,
        duplicate_match_threshold: row.duplicate_match_threshold,
        required_documents: row.required_documents,
    })
}

fn plan_to_row(plan: &Plan) -> PlanRow {
    PlanRow {
        plan_id: plan.id.into(),
        name: plan.name.clone(),
        is_active: plan.is_active,
        auto_approve_enabled: plan.auto_approve_enabled,
        auto_approve_amount_cap: plan.auto_approve_amount_cap.amount(),
        currency: plan.auto_approve_amount_cap.currency().code().to_string(),
        min_ocr_quality_score: plan.min_ocr_quality_score,
        min_confidence_score: plan.min_confidence_score,
        max_duplicate_score: plan.max_duplicate_score,
        max_fraud_risk_score: plan.max_fraud_risk_score,
        duplicate_match_threshold: plan.duplicate_match_threshold,
        required_documents: plan.required_documents.clone(),
        created_at: Utc::now(),
    }
}

fn row_to_member_policy(row: MemberPolicyRow) -> Result<MemberPolicy, DatabaseError> {
    Ok(MemberPolicy {
        id: MemberPolicyId::from(row.member_policy_id),
        user_id: UserId::from(row.user_id),
        plan_id: PlanId::from(row.plan_id),
        member_number: row.member_number,
        start_date: row.start_date,
        end_date: row.end_date,
        status: parse::<PolicyStatus>("status", &row.status)?,
    })
}

fn member_policy_to_row(policy: &MemberPolicy) -> MemberPolicyRow {
    MemberPolicyRow {
        member_policy_id: policy.id.into(),
        user_id: policy.user_id.into(),
        plan_id: policy.plan_id.into(),
        member_number: policy.member_number.clone(),
        start_date: policy.start_date,
        end_date: policy.end_date,
        status: policy.status.as_str().to_string(),
    }
}

fn row_to_rule(row: RuleRow) -> Result<ValidationRule, DatabaseError> {
    Ok(ValidationRule {
        id: RuleId::from(row.rule_id),
        name: row.name,
        description: row.description,
        rule_type: row.rule_type,
        condition: row.condition,
        severity: parse::<Severity>("severity", &row.severity)?,
        order: row.sort_order,
        plan_id: row.plan_id.map(PlanId::from),
        is_active: row.is_active,
        error_message: row.error_message,
    })
}

fn rule_to_row(rule: &ValidationRule) -> RuleRow {
    RuleRow {
        rule_id: rule.id.into(),
        name: rule.name.clone(),
        description: rule.description.clone(),
        rule_type: rule.rule_type.clone(),
        condition: rule.condition.clone(),
        severity: rule.severity.as_str().to_string(),
        sort_order: rule.order,
        plan_id: rule.plan_id.map(Into::into),
        is_active: rule.is_active,
        error_message: rule.error_message.clone(),
    }
}
