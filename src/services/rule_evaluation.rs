//! Rule evaluation client: lists compliance rules under scoped credentials,
//! filters by template prefixes, and fetches each rule's aggregate state.
//!
//! Pagination is followed to exhaustion before filtering so rules on later
//! pages are never silently dropped. Rules the source returns no state for
//! are preserved as INSUFFICIENT_DATA — absence of data must stay visible
//! downstream, never read as compliant.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_config::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_config::Client as ConfigClient;

use crate::errors::{EvalError, EvalReason};
use crate::models::rule_evaluation::{ComplianceType, RuleEvaluation};
use crate::services::role_assumer::ScopedCredentials;

/// DescribeComplianceByConfigRule accepts at most 25 rule names per call.
const DESCRIBE_CHUNK_SIZE: usize = 25;

/// One page of a rule listing.
#[derive(Debug, Clone)]
pub struct RulePage {
    pub rule_names: Vec<String>,
    pub next_token: Option<String>,
}

/// Account-scoped, paginated rule evaluation source.
#[async_trait]
pub trait RuleEvaluationSource: Send + Sync {
    async fn list_rules(&self, next_token: Option<String>) -> Result<RulePage, EvalError>;

    async fn describe_compliance(
        &self,
        rule_names: &[String],
    ) -> Result<Vec<RuleEvaluation>, EvalError>;
}

/// Builds an evaluation source from assumed credentials.
///
/// One source per job: credentials are scoped to a single target account and
/// must not leak across tenants.
pub trait EvaluationSourceFactory: Send + Sync {
    fn source_for(&self, credentials: &ScopedCredentials) -> Arc<dyn RuleEvaluationSource>;
}

/// Check a rule name against the configured prefixes (case-sensitive,
/// exact prefix match — not a glob).
pub fn matches_any_prefix(rule_name: &str, prefixes: &[String]) -> bool {
    prefixes
        .iter()
        .any(|p| !p.is_empty() && rule_name.starts_with(p.as_str()))
}

/// Fetches matching rule evaluations with bounded retry and a whole-fetch
/// timeout.
#[derive(Debug, Clone)]
pub struct RuleEvaluationClient {
    retry_attempts: u32,
    retry_base_delay: Duration,
    fetch_timeout: Duration,
}

impl RuleEvaluationClient {
    pub fn new(retry_attempts: u32, fetch_timeout: Duration) -> Self {
        Self {
            retry_attempts: retry_attempts.max(1),
            retry_base_delay: Duration::from_millis(200),
            fetch_timeout,
        }
    }

    #[cfg(test)]
    fn with_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// List all rules visible to the source, filter by prefix, and fetch the
    /// compliance state of every match.
    pub async fn fetch_matching(
        &self,
        source: &dyn RuleEvaluationSource,
        prefixes: &[String],
    ) -> Result<Vec<RuleEvaluation>, EvalError> {
        tokio::time::timeout(self.fetch_timeout, self.fetch_inner(source, prefixes))
            .await
            .map_err(|_| EvalError {
                reason: EvalReason::Unavailable,
                message: format!(
                    "evaluation fetch exceeded {}s",
                    self.fetch_timeout.as_secs()
                ),
            })?
    }

    async fn fetch_inner(
        &self,
        source: &dyn RuleEvaluationSource,
        prefixes: &[String],
    ) -> Result<Vec<RuleEvaluation>, EvalError> {
        let mut all_names: Vec<String> = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .with_retry(|| source.list_rules(token.clone()))
                .await?;
            all_names.extend(page.rule_names);
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }

        let matching: Vec<String> = all_names
            .iter()
            .filter(|name| matches_any_prefix(name, prefixes))
            .cloned()
            .collect();

        tracing::info!(
            total_rules = all_names.len(),
            matching_rules = matching.len(),
            "filtered rules by template prefixes"
        );

        if matching.is_empty() {
            return Ok(Vec::new());
        }

        let mut evaluations = Vec::with_capacity(matching.len());
        for chunk in matching.chunks(DESCRIBE_CHUNK_SIZE) {
            let described = self
                .with_retry(|| source.describe_compliance(chunk))
                .await?;
            let mut by_name: HashMap<String, RuleEvaluation> = described
                .into_iter()
                .map(|e| (e.rule_name.clone(), e))
                .collect();

            // Keep listing order and fill in rules the source returned no
            // state for.
            for name in chunk {
                let eval = by_name.remove(name).unwrap_or_else(|| {
                    RuleEvaluation::new(name.clone(), ComplianceType::InsufficientData)
                });
                evaluations.push(eval);
            }
        }

        Ok(evaluations)
    }

    /// Retry throttled calls with exponential backoff, up to the configured
    /// attempt budget, then escalate.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, EvalError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, EvalError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.retry_attempts => {
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "evaluation source throttled, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// -- AWS Config implementation --

/// AWS Config client built from assumed credentials.
pub struct AwsConfigSource {
    client: ConfigClient,
}

#[async_trait]
impl RuleEvaluationSource for AwsConfigSource {
    async fn list_rules(&self, next_token: Option<String>) -> Result<RulePage, EvalError> {
        let mut request = self.client.describe_config_rules();
        if let Some(token) = next_token {
            request = request.next_token(token);
        }
        let page = request.send().await.map_err(|e| map_eval_error(&e))?;

        let rule_names = page
            .config_rules()
            .iter()
            .filter_map(|r| r.config_rule_name().map(str::to_string))
            .collect();

        Ok(RulePage {
            rule_names,
            next_token: page.next_token().map(str::to_string),
        })
    }

    async fn describe_compliance(
        &self,
        rule_names: &[String],
    ) -> Result<Vec<RuleEvaluation>, EvalError> {
        let response = self
            .client
            .describe_compliance_by_config_rule()
            .set_config_rule_names(Some(rule_names.to_vec()))
            .send()
            .await
            .map_err(|e| map_eval_error(&e))?;

        let evaluations = response
            .compliance_by_config_rules()
            .iter()
            .filter_map(|entry| {
                let rule_name = entry.config_rule_name()?.to_string();
                let compliance = entry.compliance();
                let compliance_type = compliance
                    .and_then(|c| c.compliance_type())
                    .map(|t| parse_compliance_type(t.as_str()))
                    .unwrap_or(ComplianceType::InsufficientData);
                let evaluated_resource_count = compliance
                    .and_then(|c| c.compliance_contributor_count())
                    .map(|count| i64::from(count.capped_count()));
                Some(RuleEvaluation {
                    rule_name,
                    compliance_type,
                    evaluated_resource_count,
                })
            })
            .collect();

        Ok(evaluations)
    }
}

/// Builds per-job AWS Config sources in a fixed region.
pub struct AwsConfigSourceFactory {
    region: String,
}

impl AwsConfigSourceFactory {
    pub fn new(region: String) -> Self {
        Self { region }
    }
}

impl EvaluationSourceFactory for AwsConfigSourceFactory {
    fn source_for(&self, credentials: &ScopedCredentials) -> Arc<dyn RuleEvaluationSource> {
        // Expiry is handed to the SDK so the credentials cannot be used past
        // the window STS granted.
        let provider = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            Some(credentials.expires_at.into()),
            "compass-assumed-role",
        );
        let config = aws_sdk_config::Config::builder()
            .behavior_version(aws_sdk_config::config::BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(provider)
            .build();
        Arc::new(AwsConfigSource {
            client: ConfigClient::from_conf(config),
        })
    }
}

/// An evaluation state the source reports as unknown stays visible as
/// INSUFFICIENT_DATA.
fn parse_compliance_type(raw: &str) -> ComplianceType {
    match raw {
        "COMPLIANT" => ComplianceType::Compliant,
        "NON_COMPLIANT" => ComplianceType::NonCompliant,
        "NOT_APPLICABLE" => ComplianceType::NotApplicable,
        _ => ComplianceType::InsufficientData,
    }
}

fn map_eval_error<E, R>(err: &SdkError<E, R>) -> EvalError
where
    E: ProvideErrorMetadata,
{
    let code = err
        .as_service_error()
        .and_then(ProvideErrorMetadata::code)
        .unwrap_or_default();
    let message = err
        .as_service_error()
        .and_then(ProvideErrorMetadata::message)
        .unwrap_or("request dispatch failed")
        .to_string();
    let reason = if code.contains("Throttl") || code == "TooManyRequestsException" {
        EvalReason::Throttled
    } else if code.contains("AccessDenied") || code.contains("UnauthorizedAccess") {
        EvalReason::AccessDenied
    } else {
        EvalReason::Unavailable
    };
    EvalError { reason, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn prefixes(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prefix_match_is_exact_and_case_sensitive() {
        let configured = prefixes(&["securityhub-acm-certificate-expiration-check"]);
        assert!(matches_any_prefix(
            "securityhub-acm-certificate-expiration-check-abc123",
            &configured
        ));
        assert!(!matches_any_prefix("other-check-1", &configured));
        assert!(!matches_any_prefix(
            "Securityhub-acm-certificate-expiration-check-abc123",
            &configured
        ));
    }

    #[test]
    fn empty_prefix_matches_nothing() {
        assert!(!matches_any_prefix("any-rule", &prefixes(&[""])));
    }

    #[test]
    fn factory_builds_source_from_scoped_credentials() {
        let factory = AwsConfigSourceFactory::new("ca-central-1".to_string());
        let credentials = ScopedCredentials {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expires_at: chrono::Utc::now() + chrono::Duration::minutes(15),
        };
        let _source = factory.source_for(&credentials);
    }

    #[test]
    fn unknown_compliance_type_is_insufficient_data() {
        assert_eq!(
            parse_compliance_type("SOMETHING_NEW"),
            ComplianceType::InsufficientData
        );
        assert_eq!(parse_compliance_type("COMPLIANT"), ComplianceType::Compliant);
    }

    /// Paged fake: serves rule listings page by page and canned compliance.
    struct PagedSource {
        pages: Vec<Vec<String>>,
        described: Vec<RuleEvaluation>,
        list_calls: Mutex<u32>,
        throttle_first_n: Mutex<u32>,
    }

    impl PagedSource {
        fn new(pages: Vec<Vec<String>>, described: Vec<RuleEvaluation>) -> Self {
            Self {
                pages,
                described,
                list_calls: Mutex::new(0),
                throttle_first_n: Mutex::new(0),
            }
        }

        fn throttling(self, n: u32) -> Self {
            *self.throttle_first_n.lock().unwrap() = n;
            self
        }
    }

    #[async_trait]
    impl RuleEvaluationSource for PagedSource {
        async fn list_rules(&self, next_token: Option<String>) -> Result<RulePage, EvalError> {
            {
                let mut remaining = self.throttle_first_n.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(EvalError {
                        reason: EvalReason::Throttled,
                        message: "rate exceeded".to_string(),
                    });
                }
            }
            *self.list_calls.lock().unwrap() += 1;

            let index: usize = next_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let rule_names = self.pages.get(index).cloned().unwrap_or_default();
            let next_token = if index + 1 < self.pages.len() {
                Some((index + 1).to_string())
            } else {
                None
            };
            Ok(RulePage {
                rule_names,
                next_token,
            })
        }

        async fn describe_compliance(
            &self,
            rule_names: &[String],
        ) -> Result<Vec<RuleEvaluation>, EvalError> {
            Ok(self
                .described
                .iter()
                .filter(|e| rule_names.contains(&e.rule_name))
                .cloned()
                .collect())
        }
    }

    fn client() -> RuleEvaluationClient {
        RuleEvaluationClient::new(3, Duration::from_secs(5))
            .with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn follows_pagination_to_exhaustion() {
        let source = PagedSource::new(
            vec![
                vec!["guard-a-1".to_string()],
                vec!["unrelated".to_string()],
                vec!["guard-a-2".to_string()],
            ],
            vec![
                RuleEvaluation::new("guard-a-1", ComplianceType::Compliant),
                RuleEvaluation::new("guard-a-2", ComplianceType::NonCompliant),
            ],
        );

        let evals = client()
            .fetch_matching(&source, &prefixes(&["guard-a"]))
            .await
            .unwrap();

        assert_eq!(*source.list_calls.lock().unwrap(), 3);
        assert_eq!(evals.len(), 2);
        assert_eq!(evals[0].rule_name, "guard-a-1");
        assert_eq!(evals[1].rule_name, "guard-a-2");
    }

    #[tokio::test]
    async fn missing_compliance_preserved_as_insufficient_data() {
        let source = PagedSource::new(
            vec![vec!["guard-a-1".to_string(), "guard-a-2".to_string()]],
            vec![RuleEvaluation::new("guard-a-1", ComplianceType::Compliant)],
        );

        let evals = client()
            .fetch_matching(&source, &prefixes(&["guard-a"]))
            .await
            .unwrap();

        assert_eq!(evals.len(), 2);
        assert_eq!(evals[1].rule_name, "guard-a-2");
        assert_eq!(evals[1].compliance_type, ComplianceType::InsufficientData);
    }

    #[tokio::test]
    async fn no_matching_rules_is_empty_not_error() {
        let source = PagedSource::new(vec![vec!["other-check-1".to_string()]], vec![]);

        let evals = client()
            .fetch_matching(&source, &prefixes(&["guard-a"]))
            .await
            .unwrap();
        assert!(evals.is_empty());
    }

    #[tokio::test]
    async fn retries_throttling_then_succeeds() {
        let source = PagedSource::new(
            vec![vec!["guard-a-1".to_string()]],
            vec![RuleEvaluation::new("guard-a-1", ComplianceType::Compliant)],
        )
        .throttling(2);

        let evals = client()
            .fetch_matching(&source, &prefixes(&["guard-a"]))
            .await
            .unwrap();
        assert_eq!(evals.len(), 1);
    }

    #[tokio::test]
    async fn escalates_after_retry_budget_exhausted() {
        let source = PagedSource::new(vec![vec!["guard-a-1".to_string()]], vec![]).throttling(10);

        let err = client()
            .fetch_matching(&source, &prefixes(&["guard-a"]))
            .await
            .unwrap_err();
        assert_eq!(err.reason, EvalReason::Throttled);
    }
}
