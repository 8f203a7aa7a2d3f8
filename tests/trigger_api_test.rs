//! Tests of the job trigger endpoint over in-memory collaborators.
//!
//! A queue send that fails must not leave behind a queued job record that no
//! worker will ever pick up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Json, State};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use compass_collector::config::AppConfig;
use compass_collector::errors::{AppError, JobStep, QueueError, StoreError};
use compass_collector::models::job::{Job, JobMessage, JobResult};
use compass_collector::models::job_template::{JobTemplate, RuleTarget};
use compass_collector::routes::jobs::{self, EnqueueJobRequest};
use compass_collector::services::queue::{JobQueue, MessageOutcome, QueueMessage};
use compass_collector::stores::{JobRecordStore, JobTemplateStore};
use compass_collector::AppState;

struct StaticQueue {
    fail_sends: bool,
    sent: Mutex<Vec<JobMessage>>,
}

#[async_trait]
impl JobQueue for StaticQueue {
    async fn receive_batch(&self, _max_messages: i32) -> Result<Vec<QueueMessage>, QueueError> {
        unimplemented!("not exercised by trigger tests")
    }

    async fn report_batch(&self, _outcomes: &[MessageOutcome]) -> Result<(), QueueError> {
        unimplemented!("not exercised by trigger tests")
    }

    async fn enqueue(&self, message: &JobMessage) -> Result<String, QueueError> {
        if self.fail_sends {
            return Err(QueueError::Unavailable("queue is down".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(message.job_id.to_string())
    }
}

struct StaticTemplateStore {
    templates: HashMap<Uuid, JobTemplate>,
}

#[async_trait]
impl JobTemplateStore for StaticTemplateStore {
    async fn get_template(&self, id: Uuid) -> Result<Option<JobTemplate>, StoreError> {
        Ok(self.templates.get(&id).cloned())
    }
}

#[derive(Default)]
struct RecordingStore {
    queued: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl JobRecordStore for RecordingStore {
    async fn create_queued(&self, message: &JobMessage) -> Result<(), StoreError> {
        self.queued.lock().unwrap().push(message.job_id);
        Ok(())
    }

    async fn mark_running(
        &self,
        _message: &JobMessage,
        _attempt_count: i32,
    ) -> Result<(), StoreError> {
        unimplemented!("not exercised by trigger tests")
    }

    async fn record_success(&self, _job_id: Uuid, _result: &JobResult) -> Result<(), StoreError> {
        unimplemented!("not exercised by trigger tests")
    }

    async fn record_failure(
        &self,
        _job_id: Uuid,
        _step: JobStep,
        _reason: &str,
    ) -> Result<(), StoreError> {
        unimplemented!("not exercised by trigger tests")
    }

    async fn get_job(&self, _job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(None)
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/unused".to_string(),
        database_max_connections: 1,
        host: "127.0.0.1".to_string(),
        port: 0,
        aws_region: "ca-central-1".to_string(),
        sqs_queue_url: "http://localhost/queue".to_string(),
        sqs_endpoint_url: None,
        collector_role_name: "compass-aws-config-job".to_string(),
        batch_size: 10,
        poll_wait_seconds: 1,
        assume_timeout: Duration::from_secs(10),
        evaluation_timeout: Duration::from_secs(30),
        evaluation_retry_attempts: 3,
    }
}

fn state(fail_sends: bool) -> (AppState, Arc<StaticQueue>, Arc<RecordingStore>, Uuid) {
    let template_id = Uuid::new_v4();
    let template = JobTemplate {
        id: template_id,
        name: "ACM certificate checks".to_string(),
        documentation_link: "https://example.test/docs/acm".to_string(),
        rules: vec![RuleTarget {
            link: "https://example.test/docs/acm".to_string(),
            prefix: "securityhub-acm-certificate-expiration-check".to_string(),
        }],
    };

    let queue = Arc::new(StaticQueue {
        fail_sends,
        sent: Mutex::new(Vec::new()),
    });
    let records = Arc::new(RecordingStore::default());

    // Lazy pool: the jobs routes never touch the database directly.
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .unwrap();

    let state = AppState {
        db: pool,
        config: test_config(),
        queue: Arc::clone(&queue) as Arc<dyn JobQueue>,
        templates: Arc::new(StaticTemplateStore {
            templates: HashMap::from([(template_id, template)]),
        }),
        jobs: Arc::clone(&records) as Arc<dyn JobRecordStore>,
    };
    (state, queue, records, template_id)
}

fn request(template_id: Uuid) -> EnqueueJobRequest {
    EnqueueJobRequest {
        assessment_id: Uuid::new_v4(),
        control_id: Uuid::new_v4(),
        evidence_id: Uuid::new_v4(),
        target_account_id: "123456789012".to_string(),
        job_template_id: template_id,
    }
}

#[tokio::test]
async fn enqueue_persists_queued_record() {
    let (state, queue, records, template_id) = state(false);

    let response = jobs::enqueue(State(state), Json(request(template_id)))
        .await
        .unwrap();

    let data = response.0.data.unwrap();
    assert_eq!(queue.sent.lock().unwrap().len(), 1);
    assert_eq!(*records.queued.lock().unwrap(), vec![data.job_id]);
}

#[tokio::test]
async fn failed_send_strands_no_queued_record() {
    let (state, queue, records, template_id) = state(true);

    let err = jobs::enqueue(State(state), Json(request(template_id)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Internal(_)));
    assert!(queue.sent.lock().unwrap().is_empty());
    assert!(records.queued.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_template_is_rejected() {
    let (state, queue, records, _template_id) = state(false);

    let err = jobs::enqueue(State(state), Json(request(Uuid::new_v4())))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(queue.sent.lock().unwrap().is_empty());
    assert!(records.queued.lock().unwrap().is_empty());
}
