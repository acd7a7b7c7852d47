//! Configuration types for `studio.deploy.yaml`.
//!
//! This module defines all the structs that map to the `studio.deploy.yaml`
//! file. These types are declarative and fully describe the desired state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// The root configuration structure for a studio deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Remote control plane settings.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Polling settings for destroy and transient-state waits.
    #[serde(default)]
    pub waiter: WaiterConfig,
    /// Studios to manage.
    #[serde(default)]
    pub studios: Vec<StudioConfig>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// State backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Backend type (local or s3).
    #[serde(default)]
    pub backend: StateBackend,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Local state directory (for local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
    /// AWS S3-based state storage.
    S3,
}

/// Remote control plane settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the studio API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Upper bound for one mutating call, after which its outcome is unknown.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
    /// Reconcile attempts per studio when conflicts force a re-read.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Polling settings with exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaiterConfig {
    /// First delay between polls, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between polls, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied after each poll.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Overall deadline in seconds.
    #[serde(default = "default_wait_timeout")]
    pub timeout_secs: u64,
}

/// Authentication mode of a studio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthMode {
    /// Single sign-on through an identity center; requires a user role.
    #[default]
    Sso,
    /// IAM authentication or federation.
    Iam,
}

/// Configuration for a single studio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudioConfig {
    /// Logical key of the studio within this project.
    pub key: String,
    /// Studio display name.
    pub name: String,
    /// Authentication mode.
    #[serde(default)]
    pub auth_mode: AuthMode,
    /// VPC the studio is bound to.
    pub vpc_id: String,
    /// Subnets the studio may use.
    pub subnet_ids: Vec<String>,
    /// Service role ARN.
    pub service_role: String,
    /// User role ARN (SSO only).
    #[serde(default)]
    pub user_role: Option<String>,
    /// Security group for workspaces.
    pub workspace_security_group_id: String,
    /// Security group for the engine.
    pub engine_security_group_id: String,
    /// Default S3 location for notebook backups.
    pub default_s3_location: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Identity provider authentication URL (IAM federation).
    #[serde(default)]
    pub idp_auth_url: Option<String>,
    /// Identity provider relay state parameter name (IAM federation).
    #[serde(default)]
    pub idp_relay_state_parameter_name: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

// Default value functions

fn default_environment() -> String {
    String::from("dev")
}

fn default_endpoint() -> String {
    String::from("http://127.0.0.1:8080")
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_operation_timeout() -> u64 {
    120
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    10_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_wait_timeout() -> u64 {
    600
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            timeout_secs: default_wait_timeout(),
        }
    }
}

impl RemoteConfig {
    /// Returns the operation timeout as a duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sso => write!(f, "SSO"),
            Self::Iam => write!(f, "IAM"),
        }
    }
}

impl DeployConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Returns studio keys.
    #[must_use]
    pub fn studio_keys(&self) -> Vec<&str> {
        self.studios.iter().map(|s| s.key.as_str()).collect()
    }

    /// Finds a studio by key.
    #[must_use]
    pub fn studio(&self, key: &str) -> Option<&StudioConfig> {
        self.studios.iter().find(|s| s.key == key)
    }
}
