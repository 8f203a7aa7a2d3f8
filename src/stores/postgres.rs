//! PostgreSQL implementations of the store interfaces.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::errors::{JobStep, StoreError};
use crate::models::job::{Job, JobFailure, JobMessage, JobResult, JobStatus};
use crate::models::job_template::JobTemplate;
use crate::models::rule_evaluation::AggregateStatus;
use crate::stores::{JobRecordStore, JobTemplateStore};

pub struct PgJobTemplateStore {
    pool: PgPool,
}

impl PgJobTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    documentation_link: String,
    rules: serde_json::Value,
}

#[async_trait]
impl JobTemplateStore for PgJobTemplateStore {
    async fn get_template(&self, id: Uuid) -> Result<Option<JobTemplate>, StoreError> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT id, name, documentation_link, rules
             FROM job_templates
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let rules = serde_json::from_value(r.rules)
                .map_err(|e| StoreError::Unavailable(format!("invalid template rules: {e}")))?;
            Ok(JobTemplate {
                id: r.id,
                name: r.name,
                documentation_link: r.documentation_link,
                rules,
            })
        })
        .transpose()
    }
}

pub struct PgJobRecordStore {
    pool: PgPool,
}

impl PgJobRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRecordStore for PgJobRecordStore {
    async fn create_queued(&self, message: &JobMessage) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO job_records
                (job_id, assessment_id, control_id, evidence_id,
                 target_account_id, job_template_id, status, attempt_count)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0)
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(message.job_id)
        .bind(message.assessment_id)
        .bind(message.control_id)
        .bind(message.evidence_id)
        .bind(&message.target_account_id)
        .bind(message.job_template_id)
        .bind(JobStatus::Queued)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_running(
        &self,
        message: &JobMessage,
        attempt_count: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO job_records
                (job_id, assessment_id, control_id, evidence_id,
                 target_account_id, job_template_id, status, attempt_count)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (job_id) DO UPDATE
                SET status = EXCLUDED.status,
                    attempt_count = EXCLUDED.attempt_count,
                    updated_at = now()",
        )
        .bind(message.job_id)
        .bind(message.assessment_id)
        .bind(message.control_id)
        .bind(message.evidence_id)
        .bind(&message.target_account_id)
        .bind(message.job_template_id)
        .bind(JobStatus::Running)
        .bind(attempt_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_success(&self, job_id: Uuid, result: &JobResult) -> Result<(), StoreError> {
        let payload = serde_json::to_value(result)
            .map_err(|e| StoreError::Unavailable(format!("unserializable result: {e}")))?;

        let updated = sqlx::query(
            "UPDATE job_records
             SET status = $2, result = $3, result_status = $4,
                 failure = NULL, updated_at = now()
             WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Succeeded)
        .bind(payload)
        .bind(result.status)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("job record {job_id}")));
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        job_id: Uuid,
        step: JobStep,
        reason: &str,
    ) -> Result<(), StoreError> {
        let failure = serde_json::to_value(JobFailure {
            step,
            reason: reason.to_string(),
        })
        .map_err(|e| StoreError::Unavailable(format!("unserializable failure: {e}")))?;

        let updated = sqlx::query(
            "UPDATE job_records
             SET status = $2, result = NULL, result_status = $3,
                 failure = $4, updated_at = now()
             WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Failed)
        .bind(AggregateStatus::Error)
        .bind(failure)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("job record {job_id}")));
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT job_id, assessment_id, control_id, evidence_id,
                    target_account_id, job_template_id, status, attempt_count,
                    result, result_status, failure, created_at, updated_at
             FROM job_records
             WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }
}
