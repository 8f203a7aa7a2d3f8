pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod services;
pub mod stores;

use std::sync::Arc;

use sqlx::PgPool;

use crate::services::queue::JobQueue;
use crate::stores::{JobRecordStore, JobTemplateStore};

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: config::AppConfig,
    pub queue: Arc<dyn JobQueue>,
    pub templates: Arc<dyn JobTemplateStore>,
    pub jobs: Arc<dyn JobRecordStore>,
}
