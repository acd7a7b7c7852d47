//! Configuration parser for loading deployment files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, StudioError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::DeployConfig;

/// Environment variable holding the optional API bearer token.
pub const API_TOKEN_VAR: &str = "STUDIO_API_TOKEN";

/// Configuration parser for loading deployment configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(StudioError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StudioError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StudioError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration for project {} with {} studios",
            config.project.name,
            config.studios.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Environment variables are checked in the format:
    /// `STUDIO_<SECTION>_<KEY>` (e.g., `STUDIO_PROJECT_NAME`)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut DeployConfig) {
        if let Ok(name) = std::env::var("STUDIO_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            config.project.name = name;
        }

        if let Ok(env) = std::env::var("STUDIO_PROJECT_ENVIRONMENT") {
            debug!("Overriding project.environment from environment");
            config.project.environment = env;
        }

        if let Ok(endpoint) = std::env::var("STUDIO_REMOTE_ENDPOINT") {
            debug!("Overriding remote.endpoint from environment");
            config.remote.endpoint = endpoint;
        }

        if let Ok(bucket) = std::env::var("STUDIO_STATE_BUCKET") {
            debug!("Overriding state.bucket from environment");
            config.state.bucket = Some(bucket);
        }

        if let Ok(prefix) = std::env::var("STUDIO_STATE_PREFIX") {
            debug!("Overriding state.prefix from environment");
            config.state.prefix = Some(prefix);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StudioError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the optional API bearer token from the environment.
    #[must_use]
    pub fn api_token() -> Option<String> {
        std::env::var(API_TOKEN_VAR).ok().filter(|t| !t.is_empty())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "studio.deploy.yaml",
    "studio.deploy.yml",
    "deploy.yaml",
    "deploy.yml",
];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StudioError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, StateBackend};

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  name: test-project
state:
  backend: local
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.project.name, "test-project");
        assert_eq!(config.project.environment, "dev");
        assert!(config.studios.is_empty());
        assert_eq!(config.remote.max_attempts, 3);
        assert_eq!(config.waiter.timeout_secs, 600);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
project:
  name: analytics
  environment: prod

state:
  backend: s3
  bucket: studio-state
  prefix: analytics/prod

remote:
  endpoint: https://studios.internal.example
  operation_timeout_secs: 60

waiter:
  initial_delay_ms: 100
  timeout_secs: 30

studios:
  - key: main
    name: analytics-main
    auth_mode: SSO
    vpc_id: vpc-0a1b2c
    subnet_ids: [subnet-1]
    service_role: arn:aws:iam::123456789012:role/studio-service
    user_role: arn:aws:iam::123456789012:role/studio-user
    workspace_security_group_id: sg-11
    engine_security_group_id: sg-22
    default_s3_location: s3://analytics-bucket/test
    tags:
      team: data
"#;
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.state.backend, StateBackend::S3);
        assert_eq!(config.remote.operation_timeout_secs, 60);
        assert_eq!(config.remote.request_timeout_secs, 30);
        assert_eq!(config.waiter.initial_delay_ms, 100);
        assert_eq!(config.studios.len(), 1);

        let studio = &config.studios[0];
        assert_eq!(studio.auth_mode, AuthMode::Sso);
        assert_eq!(studio.tags.get("team").map(String::as_str), Some("data"));
        assert!(config.studio("main").is_some());
    }

    #[test]
    fn test_parse_invalid_auth_mode() {
        let yaml = r"
project:
  name: p
state:
  backend: local
studios:
  - key: main
    name: main
    auth_mode: KERBEROS
    vpc_id: vpc-1
    subnet_ids: []
    service_role: arn:aws:iam::1:role/r
    workspace_security_group_id: sg-1
    engine_security_group_id: sg-1
    default_s3_location: s3://b
";
        let result = ConfigParser::new().parse_yaml(yaml, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("studio.deploy.yaml"), "").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("studio.deploy.yaml"));
    }
}
