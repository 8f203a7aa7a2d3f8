//! Route definitions for the collector API.

pub mod health;
pub mod jobs;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

/// Build the collector's HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/api/v1/jobs", post(jobs::enqueue))
        .route("/api/v1/jobs/{id}", get(jobs::get_job))
        .with_state(state)
}
