//! State store trait definition.

use async_trait::async_trait;

use super::lock::LockInfo;
use super::types::WorkspaceState;
use crate::error::Result;

/// Storage backend for the workspace state and its lock.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the workspace state, or `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<WorkspaceState>>;

    /// Saves the workspace state.
    async fn save(&self, state: &WorkspaceState) -> Result<()>;

    /// Deletes the workspace state and any lock.
    async fn delete(&self) -> Result<()>;

    /// Checks if a state exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires the state lock for `operation`.
    ///
    /// An empty `holder` is replaced by a generated process identifier.
    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo>;

    /// Releases the lock if `lock_id` still owns it.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Removes the lock regardless of owner.
    async fn force_unlock(&self) -> Result<()>;

    /// Gets the current lock, expired or not.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if a live lock is held.
    async fn is_locked(&self) -> Result<bool> {
        Ok(self.get_lock_info().await?.is_some_and(|l| !l.is_expired()))
    }

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self) -> Result<Option<WorkspaceState>> {
        (**self).load().await
    }

    async fn save(&self, state: &WorkspaceState) -> Result<()> {
        (**self).save(state).await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }

    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }

    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder, operation).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn force_unlock(&self) -> Result<()> {
        (**self).force_unlock().await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
