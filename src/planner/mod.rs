//! Planning module for studio operations.
//!
//! This module compares a desired configuration with observed state,
//! turns the difference into a plan and executes it against a remote
//! control plane.

mod diff;
mod executor;
mod plan;

pub use diff::{AttributeChange, DiffEngine, DiffType, ResourceDiff};
pub use executor::{DEFAULT_OPERATION_TIMEOUT, ExecutionResult, PlanExecutor};
pub use plan::{Operation, ReconciliationPlan};
