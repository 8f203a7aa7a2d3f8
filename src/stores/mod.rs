//! External store interfaces: job template snapshots and job records.
//!
//! Templates are administered by the external CRUD layer; this service only
//! reads snapshots. Job records are owned here: every write is an idempotent
//! overwrite keyed by `job_id`, so crash-and-redeliver races cannot corrupt
//! state.

pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{JobStep, StoreError};
use crate::models::job::{Job, JobMessage, JobResult};
use crate::models::job_template::JobTemplate;

/// Read-only access to job template definitions.
#[async_trait]
pub trait JobTemplateStore: Send + Sync {
    async fn get_template(&self, id: Uuid) -> Result<Option<JobTemplate>, StoreError>;
}

/// Persisted job state, updated before and after each job execution.
#[async_trait]
pub trait JobRecordStore: Send + Sync {
    /// Create the `queued` record when a job is enqueued. A repeat enqueue of
    /// the same job id is a no-op.
    async fn create_queued(&self, message: &JobMessage) -> Result<(), StoreError>;

    /// Mark the job `running`. Upserts from the message so a record missing
    /// after an out-of-band enqueue is recreated rather than lost.
    async fn mark_running(
        &self,
        message: &JobMessage,
        attempt_count: i32,
    ) -> Result<(), StoreError>;

    /// Persist the result and mark the job `succeeded`. Overwrites any prior
    /// partial result for the same job id.
    async fn record_success(&self, job_id: Uuid, result: &JobResult) -> Result<(), StoreError>;

    /// Mark the job `failed` with the step that produced the error. The
    /// evidence-facing result status becomes `error` so a broken credential
    /// is never mistaken for a real compliance failure.
    async fn record_failure(
        &self,
        job_id: Uuid,
        step: JobStep,
        reason: &str,
    ) -> Result<(), StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;
}
