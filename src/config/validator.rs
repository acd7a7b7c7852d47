//! Configuration validation for deployment files.
//!
//! This module validates deployment configurations before anything talks to
//! the control plane, collecting every error and warning in one pass.

use crate::error::{ConfigError, Result, StudioError};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{
    AuthMode, DeployConfig, ProjectConfig, StateBackend, StateConfig, StudioConfig, WaiterConfig,
};

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(StudioError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    /// Collects all errors and warnings without failing.
    #[must_use]
    pub fn check(&self, config: &DeployConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_state(&config.state, &mut result);
        Self::validate_waiter(&config.waiter, &mut result);
        Self::validate_studios(&config.studios, &mut result);

        result
    }

    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.error("project.name", "Project name cannot be empty");
        } else if !is_valid_key(&project.name) {
            result.error(
                "project.name",
                format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            );
        }

        if project.environment.is_empty() {
            result.error("project.environment", "Environment cannot be empty");
        }
    }

    fn validate_state(state: &StateConfig, result: &mut ValidationResult) {
        if state.backend == StateBackend::S3
            && state.bucket.as_deref().is_none_or(str::is_empty)
        {
            result.error(
                "state.bucket",
                "S3 bucket name is required when using S3 backend",
            );
        }
    }

    fn validate_waiter(waiter: &WaiterConfig, result: &mut ValidationResult) {
        if waiter.multiplier < 1.0 {
            result.error("waiter.multiplier", "Backoff multiplier must be at least 1.0");
        }
        if waiter.initial_delay_ms > waiter.max_delay_ms {
            result.error(
                "waiter.initial_delay_ms",
                "Initial delay cannot exceed the maximum delay",
            );
        }
        if waiter.timeout_secs == 0 {
            result.error("waiter.timeout_secs", "Wait timeout must be positive");
        }
    }

    fn validate_studios(studios: &[StudioConfig], result: &mut ValidationResult) {
        if studios.is_empty() {
            result.warnings.push(String::from("No studios defined in configuration"));
            return;
        }

        let mut seen_keys = HashSet::new();
        let mut seen_names = HashSet::new();

        for (i, studio) in studios.iter().enumerate() {
            let prefix = format!("studios[{i}]");

            if !seen_keys.insert(studio.key.as_str()) {
                result.error(
                    format!("{prefix}.key"),
                    format!("Duplicate studio key: {}", studio.key),
                );
            }
            if !is_valid_key(&studio.key) {
                result.error(
                    format!("{prefix}.key"),
                    format!(
                        "Studio key '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        studio.key
                    ),
                );
            }
            if !seen_names.insert(studio.name.as_str()) {
                result.warnings.push(format!(
                    "{prefix}.name: studio name '{}' is used more than once",
                    studio.name
                ));
            }

            Self::validate_studio(studio, &prefix, result);
        }
    }

    fn validate_studio(studio: &StudioConfig, prefix: &str, result: &mut ValidationResult) {
        if studio.name.is_empty() || studio.name.len() > 256 {
            result.error(
                format!("{prefix}.name"),
                "Studio name must be between 1 and 256 characters",
            );
        }

        match studio.auth_mode {
            AuthMode::Sso if studio.user_role.is_none() => {
                result.error(
                    format!("{prefix}.user_role"),
                    "user_role is required when auth_mode is SSO",
                );
            }
            AuthMode::Iam if studio.user_role.is_some() => {
                result.error(
                    format!("{prefix}.user_role"),
                    "user_role is only valid when auth_mode is SSO",
                );
            }
            _ => {}
        }

        if studio.idp_auth_url.is_some() && studio.auth_mode != AuthMode::Iam {
            result.warnings.push(format!(
                "{prefix}.idp_auth_url: identity provider settings only apply to IAM studios"
            ));
        }

        check_prefix(&studio.vpc_id, "vpc-", &format!("{prefix}.vpc_id"), result);
        check_prefix(
            &studio.workspace_security_group_id,
            "sg-",
            &format!("{prefix}.workspace_security_group_id"),
            result,
        );
        check_prefix(
            &studio.engine_security_group_id,
            "sg-",
            &format!("{prefix}.engine_security_group_id"),
            result,
        );

        if studio.subnet_ids.is_empty() {
            result.error(
                format!("{prefix}.subnet_ids"),
                "At least one subnet is required",
            );
        }
        let mut seen_subnets = HashSet::new();
        for (j, subnet) in studio.subnet_ids.iter().enumerate() {
            check_prefix(subnet, "subnet-", &format!("{prefix}.subnet_ids[{j}]"), result);
            if !seen_subnets.insert(subnet) {
                result.warnings.push(format!(
                    "{prefix}.subnet_ids[{j}]: duplicate subnet '{subnet}' will be ignored"
                ));
            }
        }

        check_role_arn(&studio.service_role, &format!("{prefix}.service_role"), result);
        if let Some(user_role) = &studio.user_role {
            check_role_arn(user_role, &format!("{prefix}.user_role"), result);
        }

        if !studio.default_s3_location.starts_with("s3://") {
            result.error(
                format!("{prefix}.default_s3_location"),
                format!(
                    "Default S3 location must start with s3://: {}",
                    studio.default_s3_location
                ),
            );
        }

        for key in studio.tags.keys() {
            if key.is_empty() || key.len() > 128 {
                result.error(
                    format!("{prefix}.tags"),
                    "Tag keys must be between 1 and 128 characters",
                );
            }
        }
    }
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

fn check_prefix(value: &str, expected: &str, field: &str, result: &mut ValidationResult) {
    if !value.starts_with(expected) || value.len() == expected.len() {
        result.error(
            field,
            format!("'{value}' is not a valid identifier (expected prefix '{expected}')"),
        );
    }
}

fn check_role_arn(value: &str, field: &str, result: &mut ValidationResult) {
    let parts: Vec<&str> = value.splitn(6, ':').collect();
    let valid = parts.len() == 6
        && parts[0] == "arn"
        && parts[2] == "iam"
        && parts[5].starts_with("role/");
    if !valid {
        result.error(field, format!("'{value}' is not an IAM role ARN"));
    }
}

/// Checks if a key is valid (lowercase alphanumeric with hyphens).
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 63
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !key.starts_with('-')
        && !key.ends_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProjectConfig, RemoteConfig, StateConfig};
    use std::collections::BTreeMap;

    fn studio() -> StudioConfig {
        StudioConfig {
            key: String::from("main"),
            name: String::from("analytics-main"),
            auth_mode: AuthMode::Sso,
            vpc_id: String::from("vpc-0a1b"),
            subnet_ids: vec![String::from("subnet-1")],
            service_role: String::from("arn:aws:iam::123456789012:role/service"),
            user_role: Some(String::from("arn:aws:iam::123456789012:role/user")),
            workspace_security_group_id: String::from("sg-1"),
            engine_security_group_id: String::from("sg-2"),
            default_s3_location: String::from("s3://bucket/test"),
            description: None,
            idp_auth_url: None,
            idp_relay_state_parameter_name: None,
            tags: BTreeMap::new(),
        }
    }

    fn config(studios: Vec<StudioConfig>) -> DeployConfig {
        DeployConfig {
            project: ProjectConfig {
                name: String::from("analytics"),
                environment: String::from("dev"),
            },
            state: StateConfig {
                backend: StateBackend::Local,
                bucket: None,
                prefix: None,
                region: None,
                path: None,
            },
            remote: RemoteConfig::default(),
            waiter: WaiterConfig::default(),
            studios,
        }
    }

    #[test]
    fn test_valid_config() {
        let result = ConfigValidator::new().validate(&config(vec![studio()]));
        assert!(result.is_ok());
        assert!(result.unwrap().is_valid());
    }

    #[test]
    fn test_sso_requires_user_role() {
        let mut s = studio();
        s.user_role = None;
        let result = ConfigValidator::new().check(&config(vec![s]));
        assert!(result.errors.iter().any(|e| e.field == "studios[0].user_role"));
    }

    #[test]
    fn test_iam_rejects_user_role() {
        let mut s = studio();
        s.auth_mode = AuthMode::Iam;
        let result = ConfigValidator::new().check(&config(vec![s]));
        assert!(!result.is_valid());
    }

    #[test]
    fn test_duplicate_keys() {
        let result = ConfigValidator::new().check(&config(vec![studio(), studio()]));
        assert!(result.errors.iter().any(|e| e.message.contains("Duplicate studio key")));
    }

    #[test]
    fn test_identifier_prefixes() {
        let mut s = studio();
        s.vpc_id = String::from("subnet-1");
        s.engine_security_group_id = String::from("sg-");
        s.default_s3_location = String::from("https://bucket");
        s.service_role = String::from("arn:aws:s3:::bucket");
        let result = ConfigValidator::new().check(&config(vec![s]));

        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"studios[0].vpc_id"));
        assert!(fields.contains(&"studios[0].engine_security_group_id"));
        assert!(fields.contains(&"studios[0].default_s3_location"));
        assert!(fields.contains(&"studios[0].service_role"));
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        let mut cfg = config(vec![studio()]);
        cfg.state.backend = StateBackend::S3;
        assert!(ConfigValidator::new().validate(&cfg).is_err());
    }

    #[test]
    fn test_empty_studios_is_warning() {
        let result = ConfigValidator::new().check(&config(vec![]));
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("analytics-main"));
        assert!(!is_valid_key("Analytics"));
        assert!(!is_valid_key("-main"));
        assert!(!is_valid_key(""));
    }
}
