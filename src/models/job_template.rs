//! Reusable automated-check definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One compliance-rule category targeted by a template: a rule-name prefix
/// to match (case-sensitive) and a documentation URL for the category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTarget {
    pub link: String,
    pub prefix: String,
}

/// A named, reusable definition of which compliance rules to check.
///
/// Administered by the external CRUD layer; the processor reads a snapshot
/// at dispatch time and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTemplate {
    pub id: Uuid,
    pub name: String,
    pub documentation_link: String,
    pub rules: Vec<RuleTarget>,
}

impl JobTemplate {
    /// The rule-name prefixes this template matches against.
    pub fn prefixes(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.prefix.clone()).collect()
    }
}
