//! homelab-scheduler: Dependency-ordered step execution
//!
//! This crate runs provisioning steps over an explicit dependency graph:
//! - The [`Step`] contract every provisioning action implements
//! - A DAG of steps with deterministic topological ordering
//! - Sequential execution, reverse-order teardown, and run reports

pub mod graph;
pub mod report;
pub mod scheduler;
pub mod step;

pub use graph::StepGraph;
pub use report::{RunReport, StepOutcome, StepRecord};
pub use scheduler::Scheduler;
pub use step::Step;
