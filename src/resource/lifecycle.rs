//! Lifecycle state machine and in-flight operation tracking.
//!
//! A resource moves `Absent -> Creating -> Present -> Updating -> Present ->
//! Deleting -> Absent`. Mutations start only from a terminal state, and a
//! transient state left behind by an interrupted mutation must be resolved by
//! a fresh lookup before anything else happens.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::error::{ReconcileError, Result};

/// Lifecycle state of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Not created yet, or deleted.
    #[default]
    Absent,
    /// A create call is outstanding.
    Creating,
    /// Exists and is stable.
    Present,
    /// An update call is outstanding.
    Updating,
    /// A delete call is outstanding.
    Deleting,
}

/// A mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutation {
    /// Create the resource.
    Create,
    /// Update attributes or tags in place.
    Update,
    /// Delete the resource.
    Delete,
}

impl LifecycleState {
    /// Returns true for `Creating`, `Updating` and `Deleting`.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Creating | Self::Updating | Self::Deleting)
    }

    /// Returns the mutation that a transient state is waiting on.
    #[must_use]
    pub const fn pending_mutation(self) -> Option<Mutation> {
        match self {
            Self::Creating => Some(Mutation::Create),
            Self::Updating => Some(Mutation::Update),
            Self::Deleting => Some(Mutation::Delete),
            Self::Absent | Self::Present => None,
        }
    }

    /// Starts a mutation, returning the transient state to enter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the mutation is not allowed from the
    /// current state.
    pub fn begin(self, mutation: Mutation, resource: &str) -> Result<Self> {
        let next = match (self, mutation) {
            (Self::Absent, Mutation::Create) => Self::Creating,
            (Self::Present, Mutation::Update) => Self::Updating,
            (Self::Present, Mutation::Delete) => Self::Deleting,
            _ => {
                return Err(ReconcileError::InvalidTransition {
                    resource: resource.to_string(),
                    state: self.to_string(),
                    operation: mutation.to_string(),
                }
                .into());
            }
        };
        debug!("{resource}: {self} -> {next}");
        Ok(next)
    }

    /// Resolves a transient state after the mutation succeeded.
    #[must_use]
    pub const fn complete(self) -> Self {
        match self {
            Self::Creating | Self::Updating => Self::Present,
            Self::Deleting => Self::Absent,
            other => other,
        }
    }

    /// Resolves a transient state after the mutation definitely failed.
    #[must_use]
    pub const fn fail(self) -> Self {
        match self {
            Self::Creating => Self::Absent,
            Self::Updating | Self::Deleting => Self::Present,
            other => other,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
        };
        write!(f, "{state}")
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{op}")
    }
}

/// Registry of resources with an outstanding mutating call.
///
/// Shared between reconcilers that could touch the same resource. A second
/// mutation on a key that is already held is refused instead of queued.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    active: Mutex<HashMap<String, Mutation>>,
}

/// Held while a mutating call is outstanding; releases the key on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: String,
}

impl InFlightRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claims `key` for `mutation`.
    ///
    /// # Errors
    ///
    /// Returns `OperationInProgress` if the key is already claimed.
    pub fn acquire(self: &Arc<Self>, key: &str, mutation: Mutation) -> Result<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = active.get(key) {
            return Err(ReconcileError::OperationInProgress {
                resource: key.to_string(),
                operation: current.to_string(),
            }
            .into());
        }
        active.insert(key.to_string(), mutation);
        drop(active);

        Ok(InFlightGuard {
            registry: Arc::clone(self),
            key: key.to_string(),
        })
    }

    /// Returns the mutation currently holding `key`.
    #[must_use]
    pub fn current(&self, key: &str) -> Option<Mutation> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
