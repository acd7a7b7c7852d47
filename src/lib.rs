// ============================================================================
// Linting - Dangerous practices are forbidden, sloppy ones are flagged
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items should be documented
#![warn(dead_code)]                   // Unused code is flagged
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![allow(clippy::module_name_repetitions)]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// Test code may unwrap freely
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Studio Lifecycle
//!
//! Declarative, idempotent lifecycle reconciliation for analytics workspace
//! studios: remote workspaces bound to a VPC, subnets, two security groups
//! and a set of identity roles.
//!
//! ## Overview
//!
//! - Declare studios in a YAML file
//! - Create, update in place and destroy them through a [`RemoteClient`]
//! - Detect studios that were deleted or modified out of band
//! - Resolve timed-out mutations by lookup instead of blind retries
//! - Drive a studio through scripted acceptance steps with the [`harness`]
//!
//! ## Architecture
//!
//! 1. **Desired State**: a [`DesiredConfiguration`] built from `studio.deploy.yaml`
//! 2. **Observed State**: an [`ObservedState`] read from the control plane
//! 3. **Reconciler**: diffs the two, refuses in-place changes to force-new
//!    attributes, and executes the minimal plan
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`resource`]: Attributes, tags, observed state and the lifecycle state machine
//! - [`remote`]: The control plane boundary (HTTP and in-memory)
//! - [`planner`]: Diff computation, plans and plan execution
//! - [`reconciler`]: Per-studio and project-wide reconciliation
//! - [`state`]: State storage backends (local, S3)
//! - [`harness`]: Lifecycle acceptance harness
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: analytics
//!   environment: prod
//!
//! studios:
//!   - key: main
//!     name: analytics-studio
//!     auth_mode: IAM
//!     vpc_id: vpc-0a1b2c3d
//!     subnet_ids: [subnet-0a1b2c3d]
//!     service_role: arn:aws:iam::123456789012:role/studio-service
//!     workspace_security_group_id: sg-0a1b2c3d
//!     engine_security_group_id: sg-1a2b3c4d
//!     default_s3_location: s3://analytics-notebooks/main
//!     tags:
//!       team: data
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod harness;
pub mod planner;
pub mod reconciler;
pub mod remote;
pub mod resource;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigHasher, ConfigParser, ConfigValidator, DeployConfig};
pub use error::{Result, StudioError};
pub use harness::{ApplyStep, Check, ImportStep, LifecycleHarness};
pub use planner::{DiffEngine, PlanExecutor, ReconciliationPlan};
pub use reconciler::{DriftReport, ProjectReconciler, ReconciliationResult, Reconciler};
pub use remote::{HttpStudioClient, InMemoryClient, RemoteClient};
pub use resource::{DesiredConfiguration, ObservedState, ResourceId};
pub use state::{LocalStateStore, S3StateStore, StateStore, WorkspaceState};
