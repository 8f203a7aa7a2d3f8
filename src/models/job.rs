//! Job records for automated evidence collection runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::{JobError, JobStep};
use crate::models::rule_evaluation::{AggregateStatus, ComplianceSummary, RuleEvaluation};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// Check whether a status transition follows the allowed graph.
///
/// Redelivery after a crash re-enters `Running` from any non-terminal or
/// terminal state: re-running is an idempotent overwrite keyed by job_id.
pub fn is_valid_transition(from: JobStatus, to: JobStatus) -> bool {
    matches!(
        (from, to),
        (JobStatus::Queued, JobStatus::Running)
            | (JobStatus::Running, JobStatus::Succeeded)
            | (JobStatus::Running, JobStatus::Failed)
            // redelivered message re-enters running
            | (JobStatus::Running, JobStatus::Running)
            | (JobStatus::Succeeded, JobStatus::Running)
            | (JobStatus::Failed, JobStatus::Running)
    )
}

/// Queued message requesting one collection run for one evidence record
/// against one target account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: Uuid,
    pub assessment_id: Uuid,
    pub control_id: Uuid,
    pub evidence_id: Uuid,
    pub target_account_id: String,
    pub job_template_id: Uuid,
}

impl JobMessage {
    /// Parse a raw queue message body. Missing or unparseable fields are a
    /// permanent failure: redelivering the same body can never succeed.
    pub fn parse(body: &str) -> Result<Self, JobError> {
        let msg: Self =
            serde_json::from_str(body).map_err(|e| JobError::Malformed(e.to_string()))?;
        if msg.target_account_id.trim().is_empty() {
            return Err(JobError::Malformed(
                "target_account_id must not be empty".to_string(),
            ));
        }
        Ok(msg)
    }
}

/// Outcome of a completed job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub status: AggregateStatus,
    pub summary: ComplianceSummary,
    pub evaluations: Vec<RuleEvaluation>,
}

/// Failure detail attached to a failed job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub step: JobStep,
    pub reason: String,
}

/// Persisted job state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub job_id: Uuid,
    pub assessment_id: Uuid,
    pub control_id: Uuid,
    pub evidence_id: Uuid,
    pub target_account_id: String,
    pub job_template_id: Uuid,
    pub status: JobStatus,
    pub attempt_count: i32,
    pub result: Option<serde_json::Value>,
    pub result_status: Option<AggregateStatus>,
    pub failure: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
