//! Unified error handling: API response envelope plus the collection-pipeline
//! error taxonomy.
//!
//! Pipeline errors carry the step that produced them so a failed job record
//! can distinguish "can't reach this account" from "source is throttling us"
//! from "our own store is down".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error detail in the API response envelope.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Consistent JSON envelope for all API responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap a successful result in the envelope.
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            data: Some(data),
            error: None,
        })
    }

    /// Wrap an error in the envelope.
    pub fn error(code: &str, message: &str) -> Json<Self> {
        Json(Self {
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
        })
    }
}

/// Application error type mapping to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()> {
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message,
            }),
        };

        (status, Json(body)).into_response()
    }
}

// -- Collection-pipeline errors --

/// Pipeline step that produced a failure. Persisted on the job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    Parse,
    Template,
    Assume,
    Evaluate,
    Persist,
}

impl std::fmt::Display for JobStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Template => write!(f, "template"),
            Self::Assume => write!(f, "assume"),
            Self::Evaluate => write!(f, "evaluate"),
            Self::Persist => write!(f, "persist"),
        }
    }
}

/// Why a cross-account role assumption failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssumeReason {
    /// Trust relationship missing or explicitly denied.
    Denied,
    /// The role does not exist in the target account.
    NotFound,
    /// The STS call exceeded its bounded timeout.
    Timeout,
}

/// Failure assuming the collection role in a target account.
///
/// Terminal for the current job attempt; the queue decides whether the whole
/// job is retried.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to assume role in account {account_id} ({reason:?}): {message}")]
pub struct AssumeError {
    pub account_id: String,
    pub reason: AssumeReason,
    pub message: String,
}

/// Why a rule-evaluation fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalReason {
    AccessDenied,
    /// Retryable with bounded backoff before escalating to a job failure.
    Throttled,
    Unavailable,
}

/// Failure listing rules or fetching compliance from the evaluation source.
#[derive(Debug, Clone, thiserror::Error)]
#[error("rule evaluation failed ({reason:?}): {message}")]
pub struct EvalError {
    pub reason: EvalReason,
    pub message: String,
}

impl EvalError {
    pub fn is_retryable(&self) -> bool {
        self.reason == EvalReason::Throttled
    }
}

/// Failure reading or writing an external store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Unavailable(msg) => Self::Internal(msg),
        }
    }
}

/// Failure interacting with the job queue itself.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Top-level failure of one job attempt, tagged with the step that failed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Required fields absent or unparseable. Permanent: redelivery can
    /// never succeed, so the message is reported failed and logged for
    /// operator attention rather than retried here.
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("template lookup failed: {0}")]
    Template(#[source] StoreError),

    #[error(transparent)]
    Assume(#[from] AssumeError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("job record update failed: {0}")]
    Store(#[from] StoreError),
}

impl JobError {
    /// The pipeline step this error belongs to.
    pub fn step(&self) -> JobStep {
        match self {
            Self::Malformed(_) => JobStep::Parse,
            Self::Template(_) => JobStep::Template,
            Self::Assume(_) => JobStep::Assume,
            Self::Eval(_) => JobStep::Evaluate,
            Self::Store(_) => JobStep::Persist,
        }
    }

    /// Permanent errors are never retried by queue redelivery.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}
