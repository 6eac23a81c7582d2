//! Subcommand implementations

pub mod analyze;
pub mod executions;
pub mod plans;
