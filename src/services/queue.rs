//! Job queue interface and its SQS implementation.
//!
//! Batch acknowledgement is per-message: successes are deleted, failures are
//! left for visibility-timeout redelivery, and the queue's max-receive-count
//! routes exhausted messages to the dead-letter destination.

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client as SqsClient;

use crate::config::AppConfig;
use crate::errors::QueueError;
use crate::models::job::JobMessage;

/// One received queue message.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    /// How many times the queue has delivered this message, this receipt
    /// included.
    pub attempt_count: i32,
}

/// Per-message processing outcome reported back to the queue.
#[derive(Debug, Clone)]
pub struct MessageOutcome {
    pub message_id: String,
    pub receipt_handle: String,
    pub success: bool,
}

/// Queue of evidence collection jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn receive_batch(&self, max_messages: i32) -> Result<Vec<QueueMessage>, QueueError>;

    /// Report a batch's outcomes. Supports a subset of the batch failing
    /// while the rest succeed.
    async fn report_batch(&self, outcomes: &[MessageOutcome]) -> Result<(), QueueError>;

    /// Enqueue a job message, returning the queue's message id.
    async fn enqueue(&self, message: &JobMessage) -> Result<String, QueueError>;
}

/// SQS-backed job queue.
pub struct SqsJobQueue {
    client: SqsClient,
    queue_url: String,
    poll_wait_seconds: i32,
}

impl SqsJobQueue {
    pub fn new(aws_config: &aws_config::SdkConfig, config: &AppConfig) -> Self {
        let mut builder = aws_sdk_sqs::config::Builder::from(aws_config);
        if let Some(endpoint) = &config.sqs_endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Self {
            client: SqsClient::from_conf(builder.build()),
            queue_url: config.sqs_queue_url.clone(),
            poll_wait_seconds: config.poll_wait_seconds,
        }
    }
}

#[async_trait]
impl JobQueue for SqsJobQueue {
    async fn receive_batch(&self, max_messages: i32) -> Result<Vec<QueueMessage>, QueueError> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(self.poll_wait_seconds)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| QueueError::Unavailable(format!("{}", DisplayErrorContext(&e))))?;

        let mut messages = Vec::new();
        for message in response.messages() {
            let (Some(message_id), Some(receipt_handle), Some(body)) =
                (message.message_id(), message.receipt_handle(), message.body())
            else {
                tracing::warn!("received SQS message missing id, handle, or body; skipping");
                continue;
            };
            let attempt_count = message
                .attributes()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(1);

            messages.push(QueueMessage {
                message_id: message_id.to_string(),
                receipt_handle: receipt_handle.to_string(),
                body: body.to_string(),
                attempt_count,
            });
        }
        Ok(messages)
    }

    async fn report_batch(&self, outcomes: &[MessageOutcome]) -> Result<(), QueueError> {
        for outcome in outcomes {
            if !outcome.success {
                // Left on the queue: the visibility timeout expires and the
                // message is redelivered, or dead-lettered past
                // max-receive-count.
                tracing::debug!(
                    message_id = %outcome.message_id,
                    "message left for redelivery"
                );
                continue;
            }
            if let Err(e) = self
                .client
                .delete_message()
                .queue_url(&self.queue_url)
                .receipt_handle(&outcome.receipt_handle)
                .send()
                .await
            {
                // The job record is already written; redelivery re-runs an
                // idempotent overwrite, so failing to delete is safe.
                tracing::error!(
                    message_id = %outcome.message_id,
                    error = %DisplayErrorContext(&e),
                    "failed to delete acknowledged message"
                );
            }
        }
        Ok(())
    }

    async fn enqueue(&self, message: &JobMessage) -> Result<String, QueueError> {
        let body = serde_json::to_string(message)
            .map_err(|e| QueueError::Unavailable(format!("unserializable message: {e}")))?;

        let response = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Unavailable(format!("{}", DisplayErrorContext(&e))))?;

        let message_id = response
            .message_id()
            .unwrap_or_default()
            .to_string();
        tracing::info!(
            job_id = %message.job_id,
            evidence_id = %message.evidence_id,
            message_id = %message_id,
            "enqueued evidence collection job"
        );
        Ok(message_id)
    }
}
