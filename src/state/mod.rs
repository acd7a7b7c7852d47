//! Persistent workspace state.
//!
//! The state file remembers, per declared studio, the remote identifier, the
//! lifecycle state and the last observed snapshot, so that later runs can
//! refresh, detect drift and resolve unknown outcomes.

mod local;
mod lock;
mod s3;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use s3::S3StateStore;
pub use store::StateStore;
pub use types::{
    HistoryEntry, HistoryOperation, ResourceRecord, STATE_VERSION, WorkspaceState,
};

use crate::config::{DeployConfig, StateBackend};

/// Opens the state store selected by the configuration.
pub async fn open_store(config: &DeployConfig) -> crate::error::Result<Box<dyn StateStore>> {
    match config.state.backend {
        StateBackend::Local => {
            let store = match &config.state.path {
                Some(path) => LocalStateStore::with_state_path(path),
                None => LocalStateStore::new()?,
            };
            Ok(Box::new(store))
        }
        StateBackend::S3 => {
            let bucket = config.state.bucket.as_deref().ok_or_else(|| {
                crate::error::ConfigError::validation("S3 backend requires a bucket", "state.bucket")
            })?;
            let store = S3StateStore::new(
                bucket,
                config.state.prefix.as_deref(),
                config.state.region.as_deref(),
            )
            .await;
            Ok(Box::new(store))
        }
    }
}
