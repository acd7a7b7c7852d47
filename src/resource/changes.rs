//! In-place change sets sent with an update.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::attributes::AttributeValue;
use super::tags::TagDiff;

/// Attribute and tag changes for one update call.
///
/// An attribute mapped to `None` is unset on the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Attributes to set (`Some`) or clear (`None`).
    #[serde(default)]
    pub attributes: BTreeMap<String, Option<AttributeValue>>,
    /// Tag mutations.
    #[serde(default)]
    pub tags: TagDiff,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute to a new value.
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), Some(value));
        self
    }

    /// Clears an attribute.
    #[must_use]
    pub fn unset(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), None);
        self
    }

    /// Attaches a tag diff.
    #[must_use]
    pub fn with_tags(mut self, tags: TagDiff) -> Self {
        self.tags = tags;
        self
    }

    /// Returns true if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.tags.is_empty()
    }

    /// Returns true if any attribute (as opposed to only tags) changes.
    #[must_use]
    pub fn has_attribute_changes(&self) -> bool {
        !self.attributes.is_empty()
    }

    /// Names of the attributes touched by this change set.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = self
            .attributes
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{name}={value}"),
                None => format!("-{name}"),
            })
            .collect();
        if !self.tags.is_empty() {
            parts.push(self.tags.to_string());
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let mut tags = TagDiff::default();
        tags.removed.insert(String::from("b"));
        let changes = ChangeSet::new()
            .set("name", AttributeValue::text("renamed"))
            .unset("description")
            .with_tags(tags);

        assert_eq!(changes.to_string(), "-description, name=renamed, tags[-b]");
        assert!(changes.has_attribute_changes());
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_empty() {
        assert!(ChangeSet::new().is_empty());
    }
}
