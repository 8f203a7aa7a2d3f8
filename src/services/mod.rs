//! Evidence collection pipeline services.

pub mod aggregate;
pub mod consumer;
pub mod queue;
pub mod role_assumer;
pub mod rule_evaluation;
