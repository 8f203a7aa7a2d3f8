//! Cross-account role assumption via STS.
//!
//! Every monitored account carries the same well-known collection role; the
//! target ARN is built deterministically from the account id. Credentials are
//! never cached across accounts — each job gets a fresh assumption, which is
//! the tenant isolation boundary.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sts::error::ProvideErrorMetadata;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, TimeZone, Utc};

use crate::errors::{AssumeError, AssumeReason};

const ROLE_SESSION_NAME: &str = "CompassEvidenceCollector";

/// Short-lived credentials scoped to one target account.
#[derive(Debug, Clone)]
pub struct ScopedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

impl ScopedCredentials {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Produces credentials scoped to a target account.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume(&self, target_account_id: &str) -> Result<ScopedCredentials, AssumeError>;
}

/// Build the target role ARN from the account id and the fixed role name.
pub fn role_arn(target_account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{target_account_id}:role/{role_name}")
}

/// STS-backed role assumer with a bounded call timeout.
pub struct StsRoleAssumer {
    client: StsClient,
    role_name: String,
    timeout: Duration,
}

impl StsRoleAssumer {
    pub fn new(aws_config: &aws_config::SdkConfig, role_name: String, timeout: Duration) -> Self {
        Self {
            client: StsClient::new(aws_config),
            role_name,
            timeout,
        }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume(&self, target_account_id: &str) -> Result<ScopedCredentials, AssumeError> {
        let arn = role_arn(target_account_id, &self.role_name);

        let call = self
            .client
            .assume_role()
            .role_arn(&arn)
            .role_session_name(ROLE_SESSION_NAME)
            .send();

        let response = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                return Err(AssumeError {
                    account_id: target_account_id.to_string(),
                    reason: AssumeReason::Timeout,
                    message: format!("assume role timed out after {:?}", self.timeout),
                });
            }
            Ok(Err(sdk_err)) => {
                let code = sdk_err
                    .as_service_error()
                    .and_then(ProvideErrorMetadata::code)
                    .unwrap_or_default();
                let message = sdk_err
                    .as_service_error()
                    .and_then(ProvideErrorMetadata::message)
                    .unwrap_or("request dispatch failed")
                    .to_string();
                let reason = classify_assume_code(code);
                return Err(AssumeError {
                    account_id: target_account_id.to_string(),
                    reason,
                    message,
                });
            }
            Ok(Ok(resp)) => resp,
        };

        let credentials = response.credentials().ok_or_else(|| AssumeError {
            account_id: target_account_id.to_string(),
            reason: AssumeReason::Denied,
            message: "assume role response carried no credentials".to_string(),
        })?;

        let expiration = credentials.expiration();
        let expires_at = Utc
            .timestamp_opt(expiration.secs(), expiration.subsec_nanos())
            .single()
            .unwrap_or_else(Utc::now);

        tracing::info!(
            account_id = %target_account_id,
            role_arn = %arn,
            "assumed collection role"
        );

        Ok(ScopedCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expires_at,
        })
    }
}

fn classify_assume_code(code: &str) -> AssumeReason {
    if code.contains("NoSuchEntity") || code.contains("ResourceNotFound") {
        AssumeReason::NotFound
    } else {
        // Trust-relationship problems surface as AccessDenied; anything else
        // unrecognized is treated the same way, terminal for this attempt.
        AssumeReason::Denied
    }
}
