//! Configuration module for the studio lifecycle system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `studio.deploy.yaml`
//! - Validation of configuration values
//! - Computing configuration hashes for change detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    AuthMode, DeployConfig, ProjectConfig, RemoteConfig, StateBackend, StateConfig, StudioConfig,
    WaiterConfig,
};
pub use parser::{ConfigParser, find_config_file};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
