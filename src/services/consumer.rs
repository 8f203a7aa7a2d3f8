//! Job queue consumer: pulls batches of collection jobs and drives each one
//! through the pipeline.
//!
//! Per message: parse → mark running → assume role → fetch rule evaluations
//! → aggregate → persist result. Messages in a batch are processed
//! independently and concurrently; one bad target account never blocks the
//! rest. Every external write is an idempotent overwrite keyed by job_id, so
//! redelivery after a crash re-runs the pipeline safely.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::errors::{AssumeError, AssumeReason, JobError, QueueError, StoreError};
use crate::models::job::{JobMessage, JobResult};
use crate::services::aggregate::{aggregate, summarize};
use crate::services::queue::{JobQueue, MessageOutcome, QueueMessage};
use crate::services::role_assumer::RoleAssumer;
use crate::services::rule_evaluation::{EvaluationSourceFactory, RuleEvaluationClient};
use crate::stores::{JobRecordStore, JobTemplateStore};

/// Executes one collection job end to end.
pub struct JobProcessor {
    assumer: Arc<dyn RoleAssumer>,
    sources: Arc<dyn EvaluationSourceFactory>,
    templates: Arc<dyn JobTemplateStore>,
    records: Arc<dyn JobRecordStore>,
    eval_client: RuleEvaluationClient,
}

impl JobProcessor {
    pub fn new(
        assumer: Arc<dyn RoleAssumer>,
        sources: Arc<dyn EvaluationSourceFactory>,
        templates: Arc<dyn JobTemplateStore>,
        records: Arc<dyn JobRecordStore>,
        eval_client: RuleEvaluationClient,
    ) -> Self {
        Self {
            assumer,
            sources,
            templates,
            records,
            eval_client,
        }
    }

    /// Process one queue message through the full pipeline.
    pub async fn process_message(&self, message: &QueueMessage) -> Result<JobResult, JobError> {
        let job = JobMessage::parse(&message.body)?;

        self.records
            .mark_running(&job, message.attempt_count)
            .await?;

        match self.run_job(&job).await {
            Ok(result) => {
                self.records.record_success(job.job_id, &result).await?;
                tracing::info!(
                    job_id = %job.job_id,
                    evidence_id = %job.evidence_id,
                    account_id = %job.target_account_id,
                    status = ?result.status,
                    rules = result.evaluations.len(),
                    "collection job succeeded"
                );
                Ok(result)
            }
            Err(err) => {
                // Best effort: if even the failure record cannot be written,
                // queue redelivery retries the whole job.
                if let Err(store_err) = self
                    .records
                    .record_failure(job.job_id, err.step(), &err.to_string())
                    .await
                {
                    tracing::error!(
                        job_id = %job.job_id,
                        error = %store_err,
                        "failed to record job failure"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_job(&self, job: &JobMessage) -> Result<JobResult, JobError> {
        let template = self
            .templates
            .get_template(job.job_template_id)
            .await
            .map_err(JobError::Template)?
            .ok_or_else(|| {
                JobError::Template(StoreError::NotFound(format!(
                    "job template {}",
                    job.job_template_id
                )))
            })?;

        let credentials = self.assumer.assume(&job.target_account_id).await?;

        // Credentials must not be used past expiry.
        if credentials.is_expired() {
            return Err(JobError::Assume(AssumeError {
                account_id: job.target_account_id.clone(),
                reason: AssumeReason::Timeout,
                message: "assumed credentials expired before use".to_string(),
            }));
        }

        let source = self.sources.source_for(&credentials);
        let evaluations = self
            .eval_client
            .fetch_matching(source.as_ref(), &template.prefixes())
            .await?;

        let status = aggregate(&evaluations);
        Ok(JobResult {
            status,
            summary: summarize(&evaluations),
            evaluations,
        })
    }
}

/// Pulls batches from the queue and dispatches them to the processor.
pub struct QueueConsumer {
    queue: Arc<dyn JobQueue>,
    processor: Arc<JobProcessor>,
    batch_size: i32,
}

impl QueueConsumer {
    pub fn new(queue: Arc<dyn JobQueue>, processor: Arc<JobProcessor>, batch_size: i32) -> Self {
        Self {
            queue,
            processor,
            batch_size,
        }
    }

    /// Receive one batch, process its messages concurrently, and report
    /// per-message outcomes. Returns the outcomes for observability.
    pub async fn run_once(&self) -> Result<Vec<MessageOutcome>, QueueError> {
        let messages = self.queue.receive_batch(self.batch_size).await?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let mut tasks = JoinSet::new();
        for message in messages {
            let processor = Arc::clone(&self.processor);
            tasks.spawn(async move {
                let success = match processor.process_message(&message).await {
                    Ok(_) => true,
                    Err(err) if err.is_permanent() => {
                        tracing::error!(
                            message_id = %message.message_id,
                            error = %err,
                            "permanent message failure; will dead-letter, operator attention required"
                        );
                        false
                    }
                    Err(err) => {
                        tracing::warn!(
                            message_id = %message.message_id,
                            attempt = message.attempt_count,
                            step = %err.step(),
                            error = %err,
                            "job attempt failed; eligible for redelivery"
                        );
                        false
                    }
                };
                MessageOutcome {
                    message_id: message.message_id,
                    receipt_handle: message.receipt_handle,
                    success,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!(error = %e, "job task panicked"),
            }
        }

        self.queue.report_batch(&outcomes).await?;
        Ok(outcomes)
    }

    /// Long-poll the queue forever. Receive errors back off briefly instead
    /// of spinning.
    pub async fn run(&self) {
        loop {
            match self.run_once().await {
                Ok(outcomes) if !outcomes.is_empty() => {
                    let failed = outcomes.iter().filter(|o| !o.success).count();
                    tracing::debug!(
                        processed = outcomes.len(),
                        failed,
                        "batch complete"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "queue receive failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}
