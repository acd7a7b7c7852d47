//! Observed remote state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::attributes::AttributeValue;
use super::tags::TagSet;

/// Identifier assigned to a resource by the remote control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wraps a remote identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Status reported by the remote control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    /// Creation has not finished.
    Creating,
    /// Ready for use.
    #[default]
    Available,
    /// An update is being applied.
    Updating,
    /// Deletion has not finished.
    Deleting,
}

impl RemoteStatus {
    /// Returns true while the remote side is still converging.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Creating | Self::Updating | Self::Deleting)
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
        };
        write!(f, "{status}")
    }
}

/// Last known snapshot of a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    /// Remote identifier.
    pub id: ResourceId,
    /// Whether the resource exists remotely.
    pub exists: bool,
    /// Remote status.
    #[serde(default)]
    pub status: RemoteStatus,
    /// Computed ARN.
    #[serde(default)]
    pub arn: Option<String>,
    /// Computed access URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Observed attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Observed tags.
    #[serde(default)]
    pub tags: TagSet,
}

impl ObservedState {
    /// Creates a snapshot of an existing resource.
    #[must_use]
    pub fn present(id: ResourceId) -> Self {
        Self {
            id,
            exists: true,
            status: RemoteStatus::Available,
            arn: None,
            url: None,
            attributes: BTreeMap::new(),
            tags: TagSet::new(),
        }
    }

    /// Creates a snapshot of a resource known to be gone.
    #[must_use]
    pub fn absent(id: ResourceId) -> Self {
        Self {
            exists: false,
            ..Self::present(id)
        }
    }

    /// Gets an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Renders a flat attribute view, including computed fields.
    ///
    /// Keys follow the `name`, `list.#`, `tags.%`, `tags.<key>` convention so
    /// checks can address any observed value by a single string.
    #[must_use]
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        flat.insert(String::from("id"), self.id.to_string());
        if let Some(arn) = &self.arn {
            flat.insert(String::from("arn"), arn.clone());
        }
        if let Some(url) = &self.url {
            flat.insert(String::from("url"), url.clone());
        }
        for (name, value) in &self.attributes {
            match value {
                AttributeValue::Text(text) => {
                    flat.insert(name.clone(), text.clone());
                }
                AttributeValue::List(items) => {
                    flat.insert(format!("{name}.#"), items.len().to_string());
                    let mut sorted = items.clone();
                    sorted.sort();
                    for (i, item) in sorted.into_iter().enumerate() {
                        flat.insert(format!("{name}.{i}"), item);
                    }
                }
            }
        }
        flat.insert(String::from("tags.%"), self.tags.len().to_string());
        for (key, value) in &self.tags {
            flat.insert(format!("tags.{key}"), value.clone());
        }
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_keeps_identifier() {
        let state = ObservedState::absent(ResourceId::new("es-1"));
        assert!(!state.exists);
        assert_eq!(state.id.as_str(), "es-1");
    }

    #[test]
    fn test_flatten() {
        let mut state = ObservedState::present(ResourceId::new("es-1"));
        state.arn = Some(String::from("arn:aws:elasticmapreduce:us-west-2:123:studio/es-1"));
        state
            .attributes
            .insert(String::from("subnet_ids"), AttributeValue::list(["subnet-1"]));
        state.tags.insert(String::from("key1"), String::from("value1"));

        let flat = state.flatten();
        assert_eq!(flat.get("subnet_ids.#").map(String::as_str), Some("1"));
        assert_eq!(flat.get("tags.%").map(String::as_str), Some("1"));
        assert_eq!(flat.get("tags.key1").map(String::as_str), Some("value1"));
        assert!(flat.contains_key("arn"));
        assert!(!flat.contains_key("url"));
    }

    #[test]
    fn test_transient_status() {
        assert!(RemoteStatus::Creating.is_transient());
        assert!(!RemoteStatus::Available.is_transient());
    }
}
