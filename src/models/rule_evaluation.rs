//! Rule evaluation states as reported by the evaluation source, and the
//! aggregate status written back to the evidence record.

use serde::{Deserialize, Serialize};

/// Compliance state of one rule, using the source's wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceType {
    Compliant,
    NonCompliant,
    InsufficientData,
    NotApplicable,
}

/// One compliance rule's state for the target account.
///
/// `evaluated_resource_count` is absent when the source does not report a
/// contributor count for the rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule_name: String,
    pub compliance_type: ComplianceType,
    pub evaluated_resource_count: Option<i64>,
}

impl RuleEvaluation {
    pub fn new(rule_name: impl Into<String>, compliance_type: ComplianceType) -> Self {
        Self {
            rule_name: rule_name.into(),
            compliance_type,
            evaluated_resource_count: None,
        }
    }
}

/// Evidence-level compliance status.
///
/// `Error` is never produced by aggregation; the consumer writes it when a
/// job fails, so a broken credential is distinguishable from a real
/// compliance failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "aggregate_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Compliant,
    NonCompliant,
    Error,
    InsufficientData,
    NotApplicable,
}

/// Per-compliance-type counts persisted alongside the evaluations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub compliant: u32,
    pub non_compliant: u32,
    pub insufficient_data: u32,
    pub not_applicable: u32,
}
