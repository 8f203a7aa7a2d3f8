//! Job trigger and read endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::models::job::{Job, JobMessage};
use crate::AppState;

/// Request to run automated collection for one evidence record.
#[derive(Debug, Deserialize)]
pub struct EnqueueJobRequest {
    pub assessment_id: Uuid,
    pub control_id: Uuid,
    pub evidence_id: Uuid,
    pub target_account_id: String,
    pub job_template_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct EnqueueJobResponse {
    pub job_id: Uuid,
    pub message_id: String,
}

/// POST /api/v1/jobs — enqueue an automated evidence collection job.
pub async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueJobRequest>,
) -> Result<Json<ApiResponse<EnqueueJobResponse>>, AppError> {
    if request.target_account_id.trim().is_empty() {
        return Err(AppError::Validation(
            "target_account_id must not be empty".to_string(),
        ));
    }

    let template = state
        .templates
        .get_template(request.job_template_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("job template {}", request.job_template_id))
        })?;

    let message = JobMessage {
        job_id: Uuid::new_v4(),
        assessment_id: request.assessment_id,
        control_id: request.control_id,
        evidence_id: request.evidence_id,
        target_account_id: request.target_account_id,
        job_template_id: template.id,
    };

    // Enqueue before persisting: a queued record without a message behind it
    // would never be picked up, while a message without a record is recreated
    // by the worker's running upsert.
    let message_id = state
        .queue
        .enqueue(&message)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if let Err(e) = state.jobs.create_queued(&message).await {
        tracing::warn!(
            job_id = %message.job_id,
            error = %e,
            "failed to persist queued job record; worker will recreate it"
        );
    }

    Ok(ApiResponse::success(EnqueueJobResponse {
        job_id: message.job_id,
        message_id,
    }))
}

/// GET /api/v1/jobs/{id} — read a job record.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Job>>, AppError> {
    let job = state
        .jobs
        .get_job(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {id}")))?;
    Ok(ApiResponse::success(job))
}
