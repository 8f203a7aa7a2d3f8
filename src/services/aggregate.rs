//! Reduction of per-rule evaluation states into one evidence-level status.
//!
//! Worst status wins: a single failing rule is never masked by passing
//! rules, and missing data outranks a false "compliant" reading but not an
//! actual known failure.

use crate::models::rule_evaluation::{
    AggregateStatus, ComplianceSummary, ComplianceType, RuleEvaluation,
};

/// Reduce a set of rule evaluations to one aggregate status.
///
/// Precedence, first match wins:
/// 1. no evaluations → `InsufficientData` (nothing to report, not success)
/// 2. any `NON_COMPLIANT` → `NonCompliant`
/// 3. any `INSUFFICIENT_DATA` → `InsufficientData`
/// 4. all `NOT_APPLICABLE` → `NotApplicable`
/// 5. otherwise → `Compliant`
pub fn aggregate(evaluations: &[RuleEvaluation]) -> AggregateStatus {
    if evaluations.is_empty() {
        return AggregateStatus::InsufficientData;
    }
    if evaluations
        .iter()
        .any(|e| e.compliance_type == ComplianceType::NonCompliant)
    {
        return AggregateStatus::NonCompliant;
    }
    if evaluations
        .iter()
        .any(|e| e.compliance_type == ComplianceType::InsufficientData)
    {
        return AggregateStatus::InsufficientData;
    }
    if evaluations
        .iter()
        .all(|e| e.compliance_type == ComplianceType::NotApplicable)
    {
        return AggregateStatus::NotApplicable;
    }
    AggregateStatus::Compliant
}

/// Count evaluations per compliance type.
pub fn summarize(evaluations: &[RuleEvaluation]) -> ComplianceSummary {
    let mut summary = ComplianceSummary::default();
    for eval in evaluations {
        match eval.compliance_type {
            ComplianceType::Compliant => summary.compliant += 1,
            ComplianceType::NonCompliant => summary.non_compliant += 1,
            ComplianceType::InsufficientData => summary.insufficient_data += 1,
            ComplianceType::NotApplicable => summary.not_applicable += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(name: &str, ct: ComplianceType) -> RuleEvaluation {
        RuleEvaluation::new(name, ct)
    }

    #[test]
    fn empty_set_is_insufficient_data() {
        assert_eq!(aggregate(&[]), AggregateStatus::InsufficientData);
    }

    #[test]
    fn any_non_compliant_wins() {
        let evals = vec![
            eval("a", ComplianceType::Compliant),
            eval("b", ComplianceType::Compliant),
            eval("c", ComplianceType::NonCompliant),
            eval("d", ComplianceType::Compliant),
        ];
        assert_eq!(aggregate(&evals), AggregateStatus::NonCompliant);
    }

    #[test]
    fn non_compliant_outranks_insufficient_data() {
        let evals = vec![
            eval("a", ComplianceType::InsufficientData),
            eval("b", ComplianceType::NonCompliant),
        ];
        assert_eq!(aggregate(&evals), AggregateStatus::NonCompliant);
    }

    #[test]
    fn insufficient_data_outranks_compliant() {
        let evals = vec![
            eval("a", ComplianceType::Compliant),
            eval("b", ComplianceType::InsufficientData),
        ];
        assert_eq!(aggregate(&evals), AggregateStatus::InsufficientData);
    }

    #[test]
    fn all_not_applicable() {
        let evals = vec![
            eval("a", ComplianceType::NotApplicable),
            eval("b", ComplianceType::NotApplicable),
        ];
        assert_eq!(aggregate(&evals), AggregateStatus::NotApplicable);
    }

    #[test]
    fn compliant_with_not_applicable_mix() {
        let evals = vec![
            eval("a", ComplianceType::Compliant),
            eval("b", ComplianceType::NotApplicable),
        ];
        assert_eq!(aggregate(&evals), AggregateStatus::Compliant);
    }

    #[test]
    fn all_compliant() {
        let evals = vec![
            eval("a", ComplianceType::Compliant),
            eval("b", ComplianceType::Compliant),
        ];
        assert_eq!(aggregate(&evals), AggregateStatus::Compliant);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let evals = vec![
            eval("a", ComplianceType::Compliant),
            eval("b", ComplianceType::NonCompliant),
            eval("c", ComplianceType::InsufficientData),
        ];
        assert_eq!(aggregate(&evals), aggregate(&evals));
    }

    #[test]
    fn summary_counts_every_type() {
        let evals = vec![
            eval("a", ComplianceType::Compliant),
            eval("b", ComplianceType::Compliant),
            eval("c", ComplianceType::NonCompliant),
            eval("d", ComplianceType::InsufficientData),
            eval("e", ComplianceType::NotApplicable),
        ];
        let summary = summarize(&evals);
        assert_eq!(summary.compliant, 2);
        assert_eq!(summary.non_compliant, 1);
        assert_eq!(summary.insufficient_data, 1);
        assert_eq!(summary.not_applicable, 1);
    }
}
