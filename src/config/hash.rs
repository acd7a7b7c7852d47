//! Configuration hashing for change detection.
//!
//! This module provides deterministic hashing of configuration structures
//! so a plan can be tied to the exact configuration it was computed from.

use sha2::{Digest, Sha256};

use crate::resource::DesiredConfiguration;

use super::spec::{DeployConfig, StudioConfig};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire deployment configuration.
    ///
    /// This hash changes when any studio or project setting changes.
    #[must_use]
    pub fn hash_config(&self, config: &DeployConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.project.name.as_bytes());
        hasher.update(config.project.environment.as_bytes());

        // Studios sorted by key so declaration order does not matter
        let mut studios: Vec<_> = config.studios.iter().collect();
        studios.sort_by(|a, b| a.key.cmp(&b.key));
        for studio in studios {
            hasher.update(studio.key.as_bytes());
            hasher.update(self.hash_studio(studio).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single studio configuration.
    #[must_use]
    pub fn hash_studio(&self, studio: &StudioConfig) -> String {
        self.hash_desired(&DesiredConfiguration::from(studio))
    }

    /// Computes a hash of a desired configuration.
    ///
    /// Attributes and tags are kept in ordered maps and list values are
    /// normalized, so equal configurations always hash equally.
    #[must_use]
    pub fn hash_desired(&self, desired: &DesiredConfiguration) -> String {
        let mut hasher = Sha256::new();

        for (name, value) in &desired.attributes {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.to_string().as_bytes());
            hasher.update([0u8]);
        }

        hasher.update(b"tags");
        for (key, value) in &desired.tags {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMode;
    use std::collections::BTreeMap;

    fn create_test_studio(name: &str) -> StudioConfig {
        StudioConfig {
            key: String::from("main"),
            name: name.to_string(),
            auth_mode: AuthMode::Iam,
            vpc_id: String::from("vpc-1"),
            subnet_ids: vec![String::from("subnet-1"), String::from("subnet-2")],
            service_role: String::from("arn:aws:iam::123456789012:role/service"),
            user_role: None,
            workspace_security_group_id: String::from("sg-1"),
            engine_security_group_id: String::from("sg-2"),
            default_s3_location: String::from("s3://bucket/test"),
            description: None,
            idp_auth_url: None,
            idp_relay_state_parameter_name: None,
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_studio_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let studio = create_test_studio("studio");

        assert_eq!(hasher.hash_studio(&studio), hasher.hash_studio(&studio));
    }

    #[test]
    fn test_different_studios_different_hash() {
        let hasher = ConfigHasher::new();

        let hash1 = hasher.hash_studio(&create_test_studio("studio-1"));
        let hash2 = hasher.hash_studio(&create_test_studio("studio-2"));

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_subnet_order_does_not_change_hash() {
        let hasher = ConfigHasher::new();
        let a = create_test_studio("studio");
        let mut b = create_test_studio("studio");
        b.subnet_ids.reverse();

        assert_eq!(hasher.hash_studio(&a), hasher.hash_studio(&b));
    }

    #[test]
    fn test_tags_change_hash() {
        let hasher = ConfigHasher::new();
        let a = create_test_studio("studio");
        let mut b = create_test_studio("studio");
        b.tags.insert(String::from("key1"), String::from("value1"));

        assert_ne!(hasher.hash_studio(&a), hasher.hash_studio(&b));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }
}
