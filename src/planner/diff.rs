//! Diff engine for comparing a desired configuration with observed state.
//!
//! Attributes are compared by value, with list attributes treated as sets.
//! Tags are diffed per key. Only attributes known to the schema are taken
//! from the observed side, so computed fields never show up as changes.

use std::collections::BTreeSet;
use tracing::debug;

use crate::resource::{
    AttributeSchema, AttributeValue, ChangeSet, DesiredConfiguration, Mutability, ObservedState,
    TagDiff, TagSet,
};

/// Engine for computing per-resource diffs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine {
    schema: AttributeSchema,
}

/// Difference between desired and observed state for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDiff {
    /// Resource name.
    pub name: String,
    /// Kind of difference.
    pub diff_type: DiffType,
    /// Attribute-level changes.
    pub changes: Vec<AttributeChange>,
    /// Tag changes.
    pub tags: TagDiff,
}

/// Kind of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// The resource does not exist and must be created.
    Create,
    /// Only mutable attributes or tags differ.
    Update,
    /// At least one immutable attribute differs.
    Conflict,
    /// Nothing differs.
    NoChange,
}

/// One attribute that differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// Attribute name.
    pub name: String,
    /// Observed value.
    pub old_value: Option<AttributeValue>,
    /// Desired value.
    pub new_value: Option<AttributeValue>,
    /// Whether the attribute can change in place.
    pub mutability: Mutability,
}

impl DiffEngine {
    /// Creates a diff engine for the studio schema.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            schema: AttributeSchema::studio(),
        }
    }

    /// Creates a diff engine for a custom schema.
    #[must_use]
    pub const fn with_schema(schema: AttributeSchema) -> Self {
        Self { schema }
    }

    /// Computes the diff for one resource.
    ///
    /// A missing observation, or one that reports the resource as gone,
    /// yields a create.
    #[must_use]
    pub fn compute(
        &self,
        name: &str,
        desired: &DesiredConfiguration,
        observed: Option<&ObservedState>,
    ) -> ResourceDiff {
        let Some(observed) = observed.filter(|o| o.exists) else {
            debug!("{name}: not present remotely, needs create");
            return ResourceDiff {
                name: name.to_string(),
                diff_type: DiffType::Create,
                changes: desired
                    .attributes
                    .iter()
                    .map(|(attr, value)| AttributeChange {
                        name: attr.clone(),
                        old_value: None,
                        new_value: Some(value.clone()),
                        mutability: self.schema.mutability(attr),
                    })
                    .collect(),
                tags: TagDiff::compute(&TagSet::new(), &desired.tags),
            };
        };

        let changes = self.attribute_changes(desired, observed);
        let tags = TagDiff::compute(&observed.tags, &desired.tags);

        let diff_type = if changes.iter().any(|c| c.mutability == Mutability::Immutable) {
            DiffType::Conflict
        } else if changes.is_empty() && tags.is_empty() {
            DiffType::NoChange
        } else {
            DiffType::Update
        };

        debug!(
            "{name}: {diff_type} ({} attribute(s), {} tag(s))",
            changes.len(),
            tags.len()
        );

        ResourceDiff {
            name: name.to_string(),
            diff_type,
            changes,
            tags,
        }
    }

    fn attribute_changes(
        &self,
        desired: &DesiredConfiguration,
        observed: &ObservedState,
    ) -> Vec<AttributeChange> {
        let known: BTreeSet<&str> = self.schema.attributes().iter().map(|s| s.name).collect();

        let mut names: BTreeSet<&str> = desired.attributes.keys().map(String::as_str).collect();
        names.extend(
            observed
                .attributes
                .keys()
                .map(String::as_str)
                .filter(|n| known.contains(n)),
        );

        names
            .into_iter()
            .filter_map(|attr| {
                let new_value = desired.attribute(attr);
                let old_value = observed.attribute(attr);
                let same = match (old_value, new_value) {
                    (Some(old), Some(new)) => old.same_as(new),
                    (None, None) => true,
                    _ => false,
                };
                (!same).then(|| AttributeChange {
                    name: attr.to_string(),
                    old_value: old_value.cloned(),
                    new_value: new_value.cloned(),
                    mutability: self.schema.mutability(attr),
                })
            })
            .collect()
    }
}

impl ResourceDiff {
    /// Returns true if anything must change.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.diff_type != DiffType::NoChange
    }

    /// Returns the names of immutable attributes that differ.
    #[must_use]
    pub fn immutable_changes(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.mutability == Mutability::Immutable)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Builds the in-place change set for an update.
    ///
    /// Immutable changes are left out; callers reject those beforehand.
    #[must_use]
    pub fn change_set(&self) -> ChangeSet {
        let mut set = ChangeSet::new().with_tags(self.tags.clone());
        for change in self.changes.iter().filter(|c| c.mutability == Mutability::Mutable) {
            set = match &change.new_value {
                Some(value) => set.set(&change.name, value.clone()),
                None => set.unset(&change.name),
            };
        }
        set
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Conflict => write!(f, "conflict"),
            Self::NoChange => write!(f, "no change"),
        }
    }
}

impl std::fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: &Option<AttributeValue>| v.as_ref().map_or_else(|| String::from("(unset)"), ToString::to_string);
        write!(f, "{}: {} -> {}", self.name, show(&self.old_value), show(&self.new_value))?;
        if self.mutability == Mutability::Immutable {
            write!(f, " (forces new resource)")?;
        }
        Ok(())
    }
}
