//! Reference data repository
//!
//! Plans, member policies and validation rules. The pipeline only reads
//! these; the insert methods exist for seeding and tests.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: PgPool,
}

impl ReferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Option<PlanRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT plan_id, name, is_active, auto_approve_enabled, auto_approve_amount_cap,
                   currency, min_ocr_quality_score, min_confidence_score, max_duplicate_score,
                   max_fraud_risk_score, duplicate_match_threshold, required_documents, created_at
            FROM plans
            WHERE plan_id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// All of the member's policies on the plan, latest start first
    pub async fn member_policies(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Vec<MemberPolicyRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, MemberPolicyRow>(
            r#"
            SELECT member_policy_id, user_id, plan_id, member_number, start_date, end_date, status
            FROM member_policies
            WHERE user_id = $1 AND plan_id = $2
            ORDER BY start_date DESC, member_policy_id
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Global rules plus the plan's own, in evaluation order
    ///
    /// Inactive rules are returned too; the engine skips them.
    pub async fn rules_for(&self, plan_id: Option<Uuid>) -> Result<Vec<RuleRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, RuleRow>(
            r#"
            SELECT rule_id, name, description, rule_type, condition, severity, sort_order,
                   plan_id, is_active, error_message
            FROM validation_rules
            WHERE plan_id IS NULL OR plan_id = $1
            ORDER BY sort_order ASC, created_at ASC, rule_id ASC
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), plan_id = ?plan_id, "Loaded validation rules");
        Ok(rows)
    }

    pub async fn insert_plan(&self, plan: &PlanRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO plans (
                plan_id, name, is_active, auto_approve_enabled, auto_approve_amount_cap,
                currency, min_ocr_quality_score, min_confidence_score, max_duplicate_score,
                max_fraud_risk_score, duplicate_match_threshold, required_documents, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(plan.plan_id)
        .bind(&plan.name)
        .bind(plan.is_active)
        .bind(plan.auto_approve_enabled)
        .bind(plan.auto_approve_amount_cap)
        .bind(&plan.currency)
        .bind(plan.min_ocr_quality_score)
        .bind(plan.min_confidence_score)
        .bind(plan.max_duplicate_score)
        .bind(plan.max_fraud_risk_score)
        .bind(plan.duplicate_match_threshold)
        .bind(&plan.required_documents)
        .bind(plan.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DatabaseError::from(e) {
            DatabaseError::DuplicateEntry(_) => DatabaseError::duplicate("Plan", "plan_id", plan.plan_id),
            other => other,
        })?;
        Ok(())
    }

    pub async fn insert_member_policy(&self, policy: &MemberPolicyRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO member_policies (
                member_policy_id, user_id, plan_id, member_number, start_date, end_date, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(policy.member_policy_id)
        .bind(policy.user_id)
        .bind(policy.plan_id)
        .bind(&policy.member_number)
        .bind(policy.start_date)
        .bind(policy.end_date)
        .bind(&policy.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_rule(&self, rule: &RuleRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO validation_rules (
                rule_id, name, description, rule_type, condition, severity, sort_order,
                plan_id, is_active, error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(rule.rule_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(&rule.rule_type)
        .bind(&rule.condition)
        .bind(&rule.severity)
        .bind(rule.sort_order)
        .bind(rule.plan_id)
        .bind(rule.is_active)
        .bind(&rule.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Plan database row
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub plan_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub auto_approve_enabled: bool,
    pub auto_approve_amount_cap: Decimal,
    pub currency: String,
    pub min_ocr_quality_score: f64,
    pub min_confidence_score: f64,
    pub max_duplicate_score: f64,
    pub max_fraud_risk_score: f64,
    pub duplicate_match_threshold: f64,
    pub required_documents: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MemberPolicyRow {
    pub member_policy_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub member_number: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: String,
}

/// Validation rule row; `condition` is the rule's JSON parameters
#[derive(Debug, Clone, FromRow)]
pub struct RuleRow {
    pub rule_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub condition: Value,
    pub severity: String,
    pub sort_order: i32,
    pub plan_id: Option<Uuid>,
    pub is_active: bool,
    pub error_message: Option<String>,
}
