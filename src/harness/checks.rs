//! Assertions evaluated after a harness step.
//!
//! Attribute checks address observed values through the flat key
//! convention of [`ObservedState::flatten`]: `name`, `subnet_ids.#`,
//! `tags.%`, `tags.<key>`.

use std::sync::Arc;

use crate::resource::ObservedState;

/// Custom check function.
pub type CheckFn = Arc<dyn Fn(&ObservedState) -> std::result::Result<(), String> + Send + Sync>;

/// A single assertion.
#[derive(Clone)]
pub enum Check {
    /// The studio can be read from the remote by its identifier.
    Exists,
    /// Deletes the studio behind the reconciler's back and waits until it
    /// is gone. Deleting an already deleted studio is not an error.
    Disappears,
    /// A flat attribute has exactly this value.
    AttrEquals {
        /// Flat attribute key.
        key: String,
        /// Expected value.
        value: String,
    },
    /// A flat attribute is present and not empty.
    AttrSet {
        /// Flat attribute key.
        key: String,
    },
    /// A flat attribute is absent.
    AttrAbsent {
        /// Flat attribute key.
        key: String,
    },
    /// The ARN is regional, belongs to `service` and its resource part
    /// starts with `resource_prefix`.
    RegionalArn {
        /// Service namespace, such as `elasticmapreduce`.
        service: String,
        /// Expected start of the resource part, such as `studio/`.
        resource_prefix: String,
    },
    /// Arbitrary predicate over the observed state.
    Custom {
        /// Shown on failure.
        description: String,
        /// The predicate.
        check: CheckFn,
    },
}

impl Check {
    /// Checks `key == value`.
    #[must_use]
    pub fn attr(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::AttrEquals {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Checks that `key` is set.
    #[must_use]
    pub fn attr_set(key: impl Into<String>) -> Self {
        Self::AttrSet { key: key.into() }
    }

    /// Checks that `key` is not set.
    #[must_use]
    pub fn attr_absent(key: impl Into<String>) -> Self {
        Self::AttrAbsent { key: key.into() }
    }

    /// Checks the length of a list attribute.
    #[must_use]
    pub fn list_len(attribute: &str, len: usize) -> Self {
        Self::attr(format!("{attribute}.#"), len.to_string())
    }

    /// Checks the number of tags.
    #[must_use]
    pub fn tag_count(count: usize) -> Self {
        Self::attr("tags.%", count.to_string())
    }

    /// Checks a single tag.
    #[must_use]
    pub fn tag(key: &str, value: impl Into<String>) -> Self {
        Self::attr(format!("tags.{key}"), value)
    }

    /// Checks the ARN shape.
    #[must_use]
    pub fn regional_arn(service: impl Into<String>, resource_prefix: impl Into<String>) -> Self {
        Self::RegionalArn {
            service: service.into(),
            resource_prefix: resource_prefix.into(),
        }
    }

    /// Wraps a custom predicate.
    #[must_use]
    pub fn custom<F>(description: impl Into<String>, check: F) -> Self
    where
        F: Fn(&ObservedState) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Self::Custom {
            description: description.into(),
            check: Arc::new(check),
        }
    }

    /// Evaluates a check that only needs the observed snapshot.
    ///
    /// `Exists` and `Disappears` talk to the remote and are run by the
    /// harness itself; here they always pass.
    ///
    /// # Errors
    ///
    /// Returns a message describing what was observed instead.
    pub fn verify(&self, observed: &ObservedState) -> std::result::Result<(), String> {
        match self {
            Self::Exists | Self::Disappears => Ok(()),
            Self::AttrEquals { key, value } => match observed.flatten().get(key) {
                Some(actual) if actual == value => Ok(()),
                Some(actual) => Err(format!("expected {value:?}, got {actual:?}")),
                None => Err(format!("expected {value:?}, attribute not set")),
            },
            Self::AttrSet { key } => match observed.flatten().get(key) {
                Some(actual) if !actual.is_empty() => Ok(()),
                _ => Err(String::from("attribute not set")),
            },
            Self::AttrAbsent { key } => match observed.flatten().get(key) {
                Some(actual) => Err(format!("expected no value, got {actual:?}")),
                None => Ok(()),
            },
            Self::RegionalArn {
                service,
                resource_prefix,
            } => {
                let arn = observed.arn.as_deref().ok_or("ARN not set")?;
                check_regional_arn(arn, service, resource_prefix)
            }
            Self::Custom { check, .. } => check(observed),
        }
    }
}

/// Splits `arn:partition:service:region:account:resource` and checks it.
fn check_regional_arn(arn: &str, service: &str, resource_prefix: &str) -> std::result::Result<(), String> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    let [prefix, partition, svc, region, account, resource] = parts.as_slice() else {
        return Err(format!("{arn:?} is not an ARN"));
    };

    if *prefix != "arn" || partition.is_empty() {
        return Err(format!("{arn:?} is not an ARN"));
    }
    if svc != &service {
        return Err(format!("{arn:?} belongs to {svc}, expected {service}"));
    }
    if region.is_empty() {
        return Err(format!("{arn:?} is not regional"));
    }
    if account.len() != 12 || !account.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{arn:?} has an invalid account id"));
    }
    if !resource.starts_with(resource_prefix) || resource.len() == resource_prefix.len() {
        return Err(format!("{arn:?} resource does not match {resource_prefix}.+"));
    }
    Ok(())
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exists => write!(f, "exists"),
            Self::Disappears => write!(f, "disappears"),
            Self::AttrEquals { key, value } => write!(f, "{key} = {value:?}"),
            Self::AttrSet { key } => write!(f, "{key} is set"),
            Self::AttrAbsent { key } => write!(f, "{key} is not set"),
            Self::RegionalArn {
                service,
                resource_prefix,
            } => write!(f, "arn is a regional {service} ARN for {resource_prefix}.+"),
            Self::Custom { description, .. } => write!(f, "{description}"),
        }
    }
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Check({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{AttributeValue, ResourceId};

    fn observed() -> ObservedState {
        let mut state = ObservedState::present(ResourceId::new("es-1"));
        state.arn = Some(String::from(
            "arn:aws:elasticmapreduce:us-west-2:000000000000:studio/es-1",
        ));
        state
            .attributes
            .insert(String::from("name"), AttributeValue::text("analytics"));
        state
            .attributes
            .insert(String::from("subnet_ids"), AttributeValue::list(["subnet-1"]));
        state.tags.insert(String::from("key1"), String::from("value1"));
        state
    }

    #[test]
    fn test_attribute_checks() {
        let state = observed();
        assert!(Check::attr("name", "analytics").verify(&state).is_ok());
        assert!(Check::attr("name", "other").verify(&state).is_err());
        assert!(Check::list_len("subnet_ids", 1).verify(&state).is_ok());
        assert!(Check::tag_count(1).verify(&state).is_ok());
        assert!(Check::tag("key1", "value1").verify(&state).is_ok());
        assert!(Check::attr_set("arn").verify(&state).is_ok());
        assert!(Check::attr_set("url").verify(&state).is_err());
        assert!(Check::attr_absent("description").verify(&state).is_ok());
    }

    #[test]
    fn test_regional_arn() {
        let state = observed();
        assert!(Check::regional_arn("elasticmapreduce", "studio/").verify(&state).is_ok());
        assert!(Check::regional_arn("s3", "studio/").verify(&state).is_err());

        assert!(check_regional_arn("arn:aws:elasticmapreduce::000000000000:studio/x", "elasticmapreduce", "studio/").is_err());
        assert!(check_regional_arn("arn:aws:elasticmapreduce:us-west-2:000000000000:studio/", "elasticmapreduce", "studio/").is_err());
        assert!(check_regional_arn("not-an-arn", "elasticmapreduce", "studio/").is_err());
    }

    #[test]
    fn test_custom_check() {
        let check = Check::custom("has two tags", |o| {
            if o.tags.len() == 2 { Ok(()) } else { Err(format!("{} tags", o.tags.len())) }
        });
        assert_eq!(check.verify(&observed()), Err(String::from("1 tags")));
        assert_eq!(check.to_string(), "has two tags");
    }
}
