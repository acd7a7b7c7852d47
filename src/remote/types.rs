//! Wire types of the studio REST API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::{AttributeValue, ObservedState, RemoteStatus, ResourceId, TagSet};

/// A studio as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Studio {
    /// Studio identifier.
    pub id: String,
    /// Studio ARN.
    #[serde(default)]
    pub arn: Option<String>,
    /// Access URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Current status.
    #[serde(default)]
    pub status: RemoteStatus,
    /// Attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Tags.
    #[serde(default)]
    pub tags: TagSet,
}

/// Body of `POST /studios`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStudioRequest {
    /// Attributes of the new studio.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Initial tags.
    pub tags: TagSet,
}

/// Body of `PATCH /studios/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStudioRequest {
    /// Attributes to set; `null` clears an attribute.
    pub attributes: BTreeMap<String, Option<AttributeValue>>,
}

/// Body of `POST /studios/{id}/tags`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagStudioRequest {
    /// Tags to add or overwrite.
    pub tags: TagSet,
}

/// Response of `GET /studios?name=`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioList {
    /// Matching studios.
    #[serde(default)]
    pub studios: Vec<Studio>,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error message.
    #[serde(default)]
    pub message: String,
}

impl From<Studio> for ObservedState {
    fn from(studio: Studio) -> Self {
        Self {
            id: ResourceId::new(studio.id),
            exists: true,
            status: studio.status,
            arn: studio.arn,
            url: studio.url,
            attributes: studio.attributes,
            tags: studio.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_studio_deserializes_mixed_attributes() {
        let body = serde_json::json!({
            "id": "es-1",
            "arn": "arn:aws:elasticmapreduce:us-east-1:000000000000:studio/es-1",
            "status": "creating",
            "attributes": {
                "name": "analytics",
                "subnet_ids": ["subnet-2", "subnet-1"]
            },
            "tags": { "key1": "value1" }
        });

        let studio: Studio = serde_json::from_value(body).unwrap();
        let observed = ObservedState::from(studio);

        assert!(observed.exists);
        assert_eq!(observed.status, RemoteStatus::Creating);
        assert_eq!(observed.attribute("name"), Some(&AttributeValue::text("analytics")));
        assert!(matches!(
            observed.attribute("subnet_ids"),
            Some(AttributeValue::List(items)) if items.len() == 2
        ));
        assert!(observed.url.is_none());
    }
}
