//! Domain models for jobs, templates, and rule evaluations.

pub mod job;
pub mod job_template;
pub mod rule_evaluation;
