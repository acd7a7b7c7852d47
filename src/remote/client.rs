//! The remote control plane boundary.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::resource::{ChangeSet, DesiredConfiguration, ObservedState, ResourceId};

/// Client for a control plane that manages studios.
///
/// Implementations must report a missing resource as
/// [`RemoteError::NotFound`](crate::error::RemoteError::NotFound) and every
/// other failure as a distinct error, so callers never mistake a transport
/// failure for absence.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Creates a studio and returns its first observed state, carrying the
    /// newly assigned identifier.
    async fn create(&self, desired: &DesiredConfiguration) -> Result<ObservedState>;

    /// Reads a studio by identifier.
    async fn read(&self, id: &ResourceId) -> Result<ObservedState>;

    /// Applies in-place changes and returns the resulting state.
    async fn update(&self, id: &ResourceId, changes: &ChangeSet) -> Result<ObservedState>;

    /// Deletes a studio. Deleting an already deleted studio succeeds.
    async fn delete(&self, id: &ResourceId) -> Result<()>;

    /// Looks a studio up by display name.
    async fn find_by_name(&self, name: &str) -> Result<Option<ObservedState>>;
}
