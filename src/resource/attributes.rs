//! Attribute values, the studio attribute schema and desired configurations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::StudioConfig;

use super::tags::TagSet;

/// Attribute name of the studio display name.
pub const ATTR_NAME: &str = "name";
/// Attribute name of the authentication mode.
pub const ATTR_AUTH_MODE: &str = "auth_mode";
/// Attribute name of the VPC binding.
pub const ATTR_VPC_ID: &str = "vpc_id";
/// Attribute name of the subnet bindings.
pub const ATTR_SUBNET_IDS: &str = "subnet_ids";
/// Attribute name of the service role ARN.
pub const ATTR_SERVICE_ROLE: &str = "service_role";
/// Attribute name of the user role ARN.
pub const ATTR_USER_ROLE: &str = "user_role";
/// Attribute name of the workspace security group.
pub const ATTR_WORKSPACE_SG: &str = "workspace_security_group_id";
/// Attribute name of the engine security group.
pub const ATTR_ENGINE_SG: &str = "engine_security_group_id";
/// Attribute name of the default S3 location.
pub const ATTR_DEFAULT_S3_LOCATION: &str = "default_s3_location";
/// Attribute name of the description.
pub const ATTR_DESCRIPTION: &str = "description";
/// Attribute name of the identity provider URL.
pub const ATTR_IDP_AUTH_URL: &str = "idp_auth_url";
/// Attribute name of the identity provider relay state parameter.
pub const ATTR_IDP_RELAY_STATE: &str = "idp_relay_state_parameter_name";

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Scalar string value.
    Text(String),
    /// Unordered list of strings.
    List(Vec<String>),
}

impl AttributeValue {
    /// Creates a text value.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Creates a list value, sorted and deduplicated.
    #[must_use]
    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        Self::List(set.into_iter().collect())
    }

    /// Compares two values, treating lists as sets.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
            }
            _ => false,
        }
    }

    /// Returns the text value, if this is a scalar.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(_) => None,
        }
    }

    /// Returns the number of elements (1 for scalars).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(_) => 1,
            Self::List(items) => items.len(),
        }
    }

    /// Returns true for an empty list or an empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Whether an attribute can change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    /// Changeable in place.
    Mutable,
    /// Set on create only.
    Immutable,
}

/// Description of one attribute in the schema.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec {
    /// Attribute name.
    pub name: &'static str,
    /// Mutability of the attribute.
    pub mutability: Mutability,
}

const STUDIO_ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec { name: ATTR_NAME, mutability: Mutability::Mutable },
    AttributeSpec { name: ATTR_DESCRIPTION, mutability: Mutability::Mutable },
    AttributeSpec { name: ATTR_SUBNET_IDS, mutability: Mutability::Mutable },
    AttributeSpec { name: ATTR_DEFAULT_S3_LOCATION, mutability: Mutability::Mutable },
    AttributeSpec { name: ATTR_AUTH_MODE, mutability: Mutability::Immutable },
    AttributeSpec { name: ATTR_VPC_ID, mutability: Mutability::Immutable },
    AttributeSpec { name: ATTR_SERVICE_ROLE, mutability: Mutability::Immutable },
    AttributeSpec { name: ATTR_USER_ROLE, mutability: Mutability::Immutable },
    AttributeSpec { name: ATTR_WORKSPACE_SG, mutability: Mutability::Immutable },
    AttributeSpec { name: ATTR_ENGINE_SG, mutability: Mutability::Immutable },
    AttributeSpec { name: ATTR_IDP_AUTH_URL, mutability: Mutability::Immutable },
    AttributeSpec { name: ATTR_IDP_RELAY_STATE, mutability: Mutability::Immutable },
];

/// Attribute schema of a resource type.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSchema {
    attributes: &'static [AttributeSpec],
}

impl AttributeSchema {
    /// Returns the studio schema.
    #[must_use]
    pub const fn studio() -> Self {
        Self {
            attributes: STUDIO_ATTRIBUTES,
        }
    }

    /// Looks up the mutability of an attribute.
    ///
    /// Attributes unknown to the schema are treated as immutable so that an
    /// unexpected field never gets rewritten in place.
    #[must_use]
    pub fn mutability(&self, name: &str) -> Mutability {
        self.attributes
            .iter()
            .find(|spec| spec.name == name)
            .map_or(Mutability::Immutable, |spec| spec.mutability)
    }

    /// Returns the declared attributes.
    #[must_use]
    pub const fn attributes(&self) -> &'static [AttributeSpec] {
        self.attributes
    }
}

impl Default for AttributeSchema {
    fn default() -> Self {
        Self::studio()
    }
}

/// The attributes and tags a user declares for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredConfiguration {
    /// Declared attributes. Unset optional attributes are absent.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Declared tags.
    #[serde(default)]
    pub tags: TagSet,
}

impl DesiredConfiguration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Sets a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Replaces all tags.
    #[must_use]
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Gets an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Returns the remote display name, if declared.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attribute(ATTR_NAME).and_then(AttributeValue::as_text)
    }
}

impl From<&StudioConfig> for DesiredConfiguration {
    fn from(config: &StudioConfig) -> Self {
        let mut desired = Self::new()
            .with_attribute(ATTR_NAME, AttributeValue::text(&config.name))
            .with_attribute(ATTR_AUTH_MODE, AttributeValue::text(config.auth_mode.to_string()))
            .with_attribute(ATTR_VPC_ID, AttributeValue::text(&config.vpc_id))
            .with_attribute(ATTR_SUBNET_IDS, AttributeValue::list(config.subnet_ids.iter().cloned()))
            .with_attribute(ATTR_SERVICE_ROLE, AttributeValue::text(&config.service_role))
            .with_attribute(ATTR_WORKSPACE_SG, AttributeValue::text(&config.workspace_security_group_id))
            .with_attribute(ATTR_ENGINE_SG, AttributeValue::text(&config.engine_security_group_id))
            .with_attribute(ATTR_DEFAULT_S3_LOCATION, AttributeValue::text(&config.default_s3_location))
            .with_tags(config.tags.clone());

        let optional = [
            (ATTR_USER_ROLE, &config.user_role),
            (ATTR_DESCRIPTION, &config.description),
            (ATTR_IDP_AUTH_URL, &config.idp_auth_url),
            (ATTR_IDP_RELAY_STATE, &config.idp_relay_state_parameter_name),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                desired = desired.with_attribute(name, AttributeValue::text(value));
            }
        }

        desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMode;

    fn studio_config() -> StudioConfig {
        StudioConfig {
            key: String::from("analytics"),
            name: String::from("analytics-studio"),
            auth_mode: AuthMode::Iam,
            vpc_id: String::from("vpc-0a1b"),
            subnet_ids: vec![String::from("subnet-2"), String::from("subnet-1")],
            service_role: String::from("arn:aws:iam::123456789012:role/studio"),
            user_role: None,
            workspace_security_group_id: String::from("sg-1"),
            engine_security_group_id: String::from("sg-1"),
            default_s3_location: String::from("s3://bucket/test"),
            description: None,
            idp_auth_url: None,
            idp_relay_state_parameter_name: None,
            tags: TagSet::new(),
        }
    }

    #[test]
    fn test_list_is_normalized() {
        let value = AttributeValue::list(["b", "a", "b"]);
        assert_eq!(value, AttributeValue::List(vec![String::from("a"), String::from("b")]));
        assert_eq!(value.len(), 2);
    }

    #[test]
    fn test_same_as_ignores_list_order() {
        let a = AttributeValue::List(vec![String::from("x"), String::from("y")]);
        let b = AttributeValue::List(vec![String::from("y"), String::from("x")]);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&AttributeValue::text("x")));
    }

    #[test]
    fn test_schema_mutability() {
        let schema = AttributeSchema::studio();
        assert_eq!(schema.mutability(ATTR_NAME), Mutability::Mutable);
        assert_eq!(schema.mutability(ATTR_SUBNET_IDS), Mutability::Mutable);
        assert_eq!(schema.mutability(ATTR_USER_ROLE), Mutability::Immutable);
        assert_eq!(schema.mutability(ATTR_AUTH_MODE), Mutability::Immutable);
        assert_eq!(schema.mutability("something_new"), Mutability::Immutable);
    }

    #[test]
    fn test_from_studio_config_skips_unset_optionals() {
        let desired = DesiredConfiguration::from(&studio_config());

        assert_eq!(desired.name(), Some("analytics-studio"));
        assert_eq!(
            desired.attribute(ATTR_AUTH_MODE),
            Some(&AttributeValue::text("IAM"))
        );
        assert!(desired.attribute(ATTR_USER_ROLE).is_none());
        assert_eq!(
            desired.attribute(ATTR_SUBNET_IDS),
            Some(&AttributeValue::list(["subnet-1", "subnet-2"]))
        );
    }

    #[test]
    fn test_from_studio_config_includes_user_role() {
        let mut config = studio_config();
        config.auth_mode = AuthMode::Sso;
        config.user_role = Some(String::from("arn:aws:iam::123456789012:role/user"));

        let desired = DesiredConfiguration::from(&config);
        assert_eq!(
            desired.attribute(ATTR_USER_ROLE).and_then(AttributeValue::as_text),
            Some("arn:aws:iam::123456789012:role/user")
        );
    }
}
