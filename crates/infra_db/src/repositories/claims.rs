//! Claims repository implementation
//!
//! Database access for claims and the records that hang off them:
//! documents, duplicate matches, decisions, validation results and the
//! audit log. All writes go through [`ClaimsRepository::apply`], which runs
//! in a single transaction guarded by the claim's `(status, version)`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::DatabaseError;

const CLAIM_COLUMNS: &str = "claim_id, claim_number, claimant_id, plan_id, assigned_agent_id, \
    status, category, total_amount, approved_amount, currency, service_date, provider_name, \
    provider_npi, provider_type, diagnosis_codes, procedure_codes, description, \
    ocr_quality_score, extraction_confidence, duplicate_score, fraud_risk_score, \
    auto_approval_eligible, auto_approval_reasons, created_at, updated_at, submitted_at, \
    processed_at, deleted_at, version";

const DOCUMENT_COLUMNS: &str = "document_id, claim_id, file_name, content_type, file_size, \
    file_hash, document_type, ocr_quality_score, created_at";

/// Repository for claims and their dependent records
#[derive(Debug, Clone)]
pub struct ClaimsRepository {
    pool: PgPool,
}

impl ClaimsRepository {
    /// Creates a new ClaimsRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Retrieves a claim by its identifier, soft-deleted or not
    pub async fn get_by_id(&self, claim_id: Uuid) -> Result<ClaimRow, DatabaseError> {
        let sql = format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE claim_id = $1");
        sqlx::query_as::<_, ClaimRow>(&sql)
            .bind(claim_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Claim", claim_id))
    }

    /// Finds claims matching the filter, oldest first
    #[instrument(skip(self, filter))]
    pub async fn find(&self, filter: &ClaimFilter) -> Result<Vec<ClaimRow>, DatabaseError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE TRUE"
        ));

        if let Some(claimant_id) = filter.claimant_id {
            builder.push(" AND claimant_id = ").push_bind(claimant_id);
        }
        if !filter.statuses.is_empty() {
            builder
                .push(" AND status = ANY(")
                .push_bind(filter.statuses.clone())
                .push(")");
        }
        if !filter.exclude_statuses.is_empty() {
            builder
                .push(" AND NOT (status = ANY(")
                .push_bind(filter.exclude_statuses.clone())
                .push("))");
        }
        if let Some(excluded) = filter.exclude_claim {
            builder.push(" AND claim_id <> ").push_bind(excluded);
        }
        if !filter.include_deleted {
            builder.push(" AND deleted_at IS NULL");
        }
        builder.push(" ORDER BY created_at ASC, claim_id ASC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder
            .build_query_as::<ClaimRow>()
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), "Found claims");
        Ok(rows)
    }

    /// Documents attached to a claim in upload order
    pub async fn documents_for(&self, claim_id: Uuid) -> Result<Vec<DocumentRow>, DatabaseError> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM claim_documents WHERE claim_id = $1 \
             ORDER BY created_at ASC, document_id ASC"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(claim_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Oldest document with `file_hash` on any claim other than `excluding`
    pub async fn find_document_by_hash(
        &self,
        file_hash: &str,
        excluding: Uuid,
    ) -> Result<Option<DocumentRow>, DatabaseError> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM claim_documents \
             WHERE file_hash = $1 AND claim_id <> $2 \
             ORDER BY created_at ASC LIMIT 1"
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(file_hash)
            .bind(excluding)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn matches_for(&self, claim_id: Uuid) -> Result<Vec<DuplicateMatchRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, DuplicateMatchRow>(
            r#"
            SELECT match_id, claim_id, matched_claim_id, similarity_score, reasons, created_at
            FROM duplicate_matches
            WHERE claim_id = $1
            ORDER BY created_at ASC, match_id ASC
            "#,
        )
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn decisions_for(&self, claim_id: Uuid) -> Result<Vec<DecisionRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, DecisionRow>(
            r#"
            SELECT decision_id, claim_id, decision, is_auto_decision, approved_amount, currency,
                   reason_code, reason_description, notes, reasons, decided_by, created_at
            FROM claim_decisions
            WHERE claim_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Latest validation results in rule order
    pub async fn validation_results_for(
        &self,
        claim_id: Uuid,
    ) -> Result<Vec<ValidationResultRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ValidationResultRow>(
            r#"
            SELECT claim_id, position, rule_id, rule_name, passed, severity, message, details, created_at
            FROM validation_results
            WHERE claim_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Appends one audit entry outside of a claim commit
    pub async fn append_audit(&self, entry: &AuditRow) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        insert_audit(&mut *conn, entry).await
    }

    /// Audit entries for one entity in append order
    pub async fn audit_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT audit_id, entity_type, entity_id, action, actor_id,
                   before_state, after_state, metadata, created_at
            FROM audit_log
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Writes one pipeline step in a single transaction
    ///
    /// The claim row is inserted when `expected` is `None`, otherwise updated
    /// only if it still holds the expected status and version. A lost
    /// compare-and-set rolls everything back and returns `Conflict`.
    #[instrument(skip(self, commit), fields(claim_id = %commit.claim.claim_id, status = %commit.claim.status))]
    pub async fn apply(&self, commit: CommitRows) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let claim_id = commit.claim.claim_id;

        match &commit.expected {
            None => {
                let sql = format!(
                    "INSERT INTO claims ({CLAIM_COLUMNS}) VALUES (\
                     $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
                     $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29) \
                     ON CONFLICT (claim_id) DO NOTHING"
                );
                let result = bind_claim(sqlx::query(&sql), commit.claim.clone())
                    .execute(&mut *tx)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(DatabaseError::Conflict(format!(
                        "claim {claim_id} already exists"
                    )));
                }
            }
            Some((status, version)) => {
                let result = bind_claim(sqlx::query(UPDATE_CLAIM), commit.claim.clone())
                    .bind(status.clone())
                    .bind(*version)
                    .execute(&mut *tx)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(DatabaseError::Conflict(format!(
                        "claim {claim_id} is no longer {status} at version {version}"
                    )));
                }
            }
        }

        if let Some(decision) = &commit.decision {
            sqlx::query(
                r#"
                INSERT INTO claim_decisions (
                    decision_id, claim_id, decision, is_auto_decision, approved_amount, currency,
                    reason_code, reason_description, notes, reasons, decided_by, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(decision.decision_id)
            .bind(decision.claim_id)
            .bind(&decision.decision)
            .bind(decision.is_auto_decision)
            .bind(decision.approved_amount)
            .bind(&decision.currency)
            .bind(&decision.reason_code)
            .bind(&decision.reason_description)
            .bind(&decision.notes)
            .bind(&decision.reasons)
            .bind(decision.decided_by)
            .bind(decision.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for document in &commit.documents {
            let sql = format!(
                "INSERT INTO claim_documents ({DOCUMENT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            );
            sqlx::query(&sql)
                .bind(document.document_id)
                .bind(document.claim_id)
                .bind(&document.file_name)
                .bind(&document.content_type)
                .bind(document.file_size)
                .bind(&document.file_hash)
                .bind(&document.document_type)
                .bind(document.ocr_quality_score)
                .bind(document.created_at)
                .execute(&mut *tx)
                .await?;
        }

        for found in &commit.duplicate_matches {
            sqlx::query(
                r#"
                INSERT INTO duplicate_matches (
                    match_id, claim_id, matched_claim_id, similarity_score, reasons, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (claim_id, matched_claim_id) DO NOTHING
                "#,
            )
            .bind(found.match_id)
            .bind(found.claim_id)
            .bind(found.matched_claim_id)
            .bind(found.similarity_score)
            .bind(&found.reasons)
            .bind(found.created_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(results) = &commit.validation_results {
            sqlx::query("DELETE FROM validation_results WHERE claim_id = $1")
                .bind(claim_id)
                .execute(&mut *tx)
                .await?;

            for result in results {
                sqlx::query(
                    r#"
                    INSERT INTO validation_results (
                        claim_id, position, rule_id, rule_name, passed, severity,
                        message, details, created_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(result.claim_id)
                .bind(result.position)
                .bind(result.rule_id)
                .bind(&result.rule_name)
                .bind(result.passed)
                .bind(&result.severity)
                .bind(&result.message)
                .bind(&result.details)
                .bind(result.created_at)
                .execute(&mut *tx)
                .await?;
            }
        }

        for entry in &commit.audit {
            insert_audit(&mut *tx, entry).await?;
        }

        tx.commit().await?;

        debug!(
            documents = commit.documents.len(),
            matches = commit.duplicate_matches.len(),
            audit = commit.audit.len(),
            "Committed claim"
        );
        Ok(())
    }
}

const UPDATE_CLAIM: &str = r#"
    UPDATE claims SET
        claim_number = $2, claimant_id = $3, plan_id = $4, assigned_agent_id = $5,
        status = $6, category = $7, total_amount = $8, approved_amount = $9, currency = $10,
        service_date = $11, provider_name = $12, provider_npi = $13, provider_type = $14,
        diagnosis_codes = $15, procedure_codes = $16, description = $17,
        ocr_quality_score = $18, extraction_confidence = $19, duplicate_score = $20,
        fraud_risk_score = $21, auto_approval_eligible = $22, auto_approval_reasons = $23,
        created_at = $24, updated_at = $25, submitted_at = $26, processed_at = $27,
        deleted_at = $28, version = $29
    WHERE claim_id = $1 AND status = $30 AND version = $31
"#;

/// Binds the claim columns as `$1..$29`, in `CLAIM_COLUMNS` order
fn bind_claim<'q>(
    query: Query<'q, Postgres, PgArguments>,
    row: ClaimRow,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(row.claim_id)
        .bind(row.claim_number)
        .bind(row.claimant_id)
        .bind(row.plan_id)
        .bind(row.assigned_agent_id)
        .bind(row.status)
        .bind(row.category)
        .bind(row.total_amount)
        .bind(row.approved_amount)
        .bind(row.currency)
        .bind(row.service_date)
        .bind(row.provider_name)
        .bind(row.provider_npi)
        .bind(row.provider_type)
        .bind(row.diagnosis_codes)
        .bind(row.procedure_codes)
        .bind(row.description)
        .bind(row.ocr_quality_score)
        .bind(row.extraction_confidence)
        .bind(row.duplicate_score)
        .bind(row.fraud_risk_score)
        .bind(row.auto_approval_eligible)
        .bind(row.auto_approval_reasons)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.submitted_at)
        .bind(row.processed_at)
        .bind(row.deleted_at)
        .bind(row.version)
}

async fn insert_audit(conn: &mut PgConnection, entry: &AuditRow) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (
            audit_id, entity_type, entity_id, action, actor_id,
            before_state, after_state, metadata, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.audit_id)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.action)
    .bind(entry.actor_id)
    .bind(&entry.before_state)
    .bind(&entry.after_state)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Filter for [`ClaimsRepository::find`]
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub claimant_id: Option<Uuid>,
    pub statuses: Vec<String>,
    pub exclude_statuses: Vec<String>,
    pub exclude_claim: Option<Uuid>,
    pub include_deleted: bool,
    pub limit: Option<i64>,
}

/// Everything one pipeline step writes
#[derive(Debug, Clone)]
pub struct CommitRows {
    pub claim: ClaimRow,
    /// `None` inserts; `Some((status, version))` guards an update
    pub expected: Option<(String, i64)>,
    pub decision: Option<DecisionRow>,
    pub documents: Vec<DocumentRow>,
    pub duplicate_matches: Vec<DuplicateMatchRow>,
    pub validation_results: Option<Vec<ValidationResultRow>>,
    pub audit: Vec<AuditRow>,
}

/// Claim database row
#[derive(Debug, Clone, FromRow)]
pub struct ClaimRow {
    pub claim_id: Uuid,
    pub claim_number: String,
    pub claimant_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub assigned_agent_id: Option<Uuid>,
    pub status: String,
    pub category: String,
    pub total_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub currency: String,
    pub service_date: Option<NaiveDate>,
    pub provider_name: Option<String>,
    pub provider_npi: Option<String>,
    pub provider_type: Option<String>,
    pub diagnosis_codes: Vec<String>,
    pub procedure_codes: Vec<String>,
    pub description: Option<String>,
    pub ocr_quality_score: Option<f64>,
    pub extraction_confidence: Option<f64>,
    pub duplicate_score: f64,
    pub fraud_risk_score: f64,
    pub auto_approval_eligible: bool,
    pub auto_approval_reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Claim document database row
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub document_id: Uuid,
    pub claim_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub file_hash: String,
    pub document_type: Option<String>,
    pub ocr_quality_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DuplicateMatchRow {
    pub match_id: Uuid,
    pub claim_id: Uuid,
    pub matched_claim_id: Uuid,
    pub similarity_score: f64,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DecisionRow {
    pub decision_id: Uuid,
    pub claim_id: Uuid,
    pub decision: String,
    pub is_auto_decision: bool,
    pub approved_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub reason_code: Option<String>,
    pub reason_description: Option<String>,
    pub notes: Option<String>,
    pub reasons: Vec<String>,
    pub decided_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// One rule outcome; `position` keeps rule order
#[derive(Debug, Clone, FromRow)]
pub struct ValidationResultRow {
    pub claim_id: Uuid,
    pub position: i32,
    pub rule_id: Uuid,
    pub rule_name: String,
    pub passed: bool,
    pub severity: String,
    pub message: Option<String>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    pub audit_id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}
