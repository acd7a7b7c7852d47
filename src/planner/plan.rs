//! Reconciliation plans.
//!
//! A plan is the ordered list of remote operations that moves one studio
//! from its observed state to its desired state. An empty plan means the
//! studio has converged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};
use crate::resource::{ChangeSet, DesiredConfiguration, Mutation, ResourceId};

use super::diff::{DiffType, ResourceDiff};

/// A single remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create the studio with the full desired configuration.
    Create(DesiredConfiguration),
    /// Change mutable attributes and tags in place.
    Update(ChangeSet),
    /// Delete the studio.
    Delete(ResourceId),
}

/// Plan for one studio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Logical resource name.
    pub resource: String,
    /// Hash of the desired configuration this plan is based on.
    pub config_hash: String,
    /// Operations in execution order.
    pub operations: Vec<Operation>,
}

impl Operation {
    /// Returns the lifecycle mutation this operation performs.
    #[must_use]
    pub const fn mutation(&self) -> Mutation {
        match self {
            Self::Create(_) => Mutation::Create,
            Self::Update(_) => Mutation::Update,
            Self::Delete(_) => Mutation::Delete,
        }
    }
}

impl ReconciliationPlan {
    /// Creates a plan from a diff.
    ///
    /// # Errors
    ///
    /// Returns `ImmutableAttributeConflict` if the diff touches an attribute
    /// that can only be set on create. The resource is never replaced
    /// silently.
    pub fn from_diff(
        diff: &ResourceDiff,
        desired: &DesiredConfiguration,
        config_hash: &str,
    ) -> Result<Self> {
        let operations = match diff.diff_type {
            DiffType::Create => vec![Operation::Create(desired.clone())],
            DiffType::Update => vec![Operation::Update(diff.change_set())],
            DiffType::NoChange => vec![],
            DiffType::Conflict => {
                return Err(ReconcileError::ImmutableAttributeConflict {
                    resource: diff.name.clone(),
                    attributes: diff.immutable_changes(),
                }
                .into());
            }
        };

        Ok(Self {
            created_at: Utc::now(),
            resource: diff.name.clone(),
            config_hash: config_hash.to_string(),
            operations,
        })
    }

    /// Creates a plan that deletes the studio.
    #[must_use]
    pub fn destroy(resource: &str, id: ResourceId) -> Self {
        Self {
            created_at: Utc::now(),
            resource: resource.to_string(),
            config_hash: String::new(),
            operations: vec![Operation::Delete(id)],
        }
    }

    /// Creates an empty plan (no changes needed).
    #[must_use]
    pub fn empty(resource: &str, config_hash: &str) -> Self {
        Self {
            created_at: Utc::now(),
            resource: resource.to_string(),
            config_hash: config_hash.to_string(),
            operations: vec![],
        }
    }

    /// Returns true if the plan has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns the mutations in execution order.
    #[must_use]
    pub fn mutations(&self) -> Vec<Mutation> {
        self.operations.iter().map(Operation::mutation).collect()
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create(desired) => write!(
                f,
                "create {} ({} attributes, {} tags)",
                desired.name().unwrap_or("<unnamed>"),
                desired.attributes.len(),
                desired.tags.len()
            ),
            Self::Update(changes) => write!(f, "update {changes}"),
            Self::Delete(id) => write!(f, "delete {id}"),
        }
    }
}

impl std::fmt::Display for ReconciliationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "{}: no changes required", self.resource);
        }

        writeln!(f, "{}: {} operation(s)", self.resource, self.len())?;
        for (i, op) in self.operations.iter().enumerate() {
            writeln!(f, "  {}. {op}", i + 1)?;
        }
        Ok(())
    }
}
