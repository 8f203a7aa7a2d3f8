use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub aws_region: String,
    pub sqs_queue_url: String,
    /// Optional endpoint override for local SQS (e.g. LocalStack).
    pub sqs_endpoint_url: Option<String>,
    /// Role that must exist in every monitored account.
    pub collector_role_name: String,
    pub batch_size: i32,
    pub poll_wait_seconds: i32,
    pub assume_timeout: Duration,
    pub evaluation_timeout: Duration,
    pub evaluation_retry_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            host: env::var("COLLECTOR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("COLLECTOR_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "ca-central-1".to_string()),
            sqs_queue_url: env::var("SQS_QUEUE_URL")?,
            sqs_endpoint_url: env::var("SQS_ENDPOINT_URL").ok(),
            collector_role_name: env::var("COLLECTOR_ROLE_NAME")
                .unwrap_or_else(|_| "compass-aws-config-job".to_string()),
            batch_size: env::var("JOB_BATCH_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            poll_wait_seconds: env::var("JOB_POLL_WAIT_SECONDS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            assume_timeout: Duration::from_secs(
                env::var("ASSUME_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            ),
            evaluation_timeout: Duration::from_secs(
                env::var("EVALUATION_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            ),
            evaluation_retry_attempts: env::var("EVALUATION_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
        })
    }
}
