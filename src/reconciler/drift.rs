//! Drift between what was last observed and what the remote reports now.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::resource::{ObservedState, ResourceId};

/// A change made outside of this tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Drift {
    /// The studio was present and is now gone.
    ExternallyDeleted {
        /// Identifier that no longer resolves.
        id: ResourceId,
    },
    /// Attributes or tags changed since the last observation.
    Modified {
        /// Studio identifier.
        id: ResourceId,
        /// Changed fields; tags appear as `tags.<key>`.
        fields: Vec<String>,
    },
}

impl Drift {
    /// Compares two snapshots of the same studio.
    ///
    /// Returns `None` if no attribute or tag changed. Status and computed
    /// fields are not drift.
    #[must_use]
    pub fn between(previous: &ObservedState, current: &ObservedState) -> Option<Self> {
        let mut fields = Vec::new();

        let names: BTreeSet<&String> = previous
            .attributes
            .keys()
            .chain(current.attributes.keys())
            .collect();
        for name in names {
            let same = match (previous.attribute(name), current.attribute(name)) {
                (Some(a), Some(b)) => a.same_as(b),
                (None, None) => true,
                _ => false,
            };
            if !same {
                fields.push(name.clone());
            }
        }

        let keys: BTreeSet<&String> = previous.tags.keys().chain(current.tags.keys()).collect();
        fields.extend(
            keys.into_iter()
                .filter(|k| previous.tags.get(*k) != current.tags.get(*k))
                .map(|k| format!("tags.{k}")),
        );

        (!fields.is_empty()).then(|| Self::Modified {
            id: current.id.clone(),
            fields,
        })
    }

    /// Returns the affected identifier.
    #[must_use]
    pub const fn id(&self) -> &ResourceId {
        match self {
            Self::ExternallyDeleted { id } | Self::Modified { id, .. } => id,
        }
    }
}

impl std::fmt::Display for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExternallyDeleted { id } => write!(f, "{id} was deleted outside of studioctl"),
            Self::Modified { id, fields } => {
                write!(f, "{id} was modified outside of studioctl: {}", fields.join(", "))
            }
        }
    }
}
