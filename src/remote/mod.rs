//! Remote control plane integration.
//!
//! This module defines the [`RemoteClient`] boundary and its two
//! implementations: an HTTP client for a studio REST API and an in-memory
//! control plane used by tests and the lifecycle harness.

mod client;
mod http;
mod memory;
mod types;
mod waiter;

pub use client::RemoteClient;
#[cfg(test)]
pub use client::MockRemoteClient;
pub use http::HttpStudioClient;
pub use memory::{Call, CallCounts, Fault, InMemoryClient};
pub use types::{CreateStudioRequest, Studio, StudioList, TagStudioRequest, UpdateStudioRequest};
pub use waiter::{WaitPolicy, wait_for_absence, wait_until_stable};
