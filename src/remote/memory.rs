//! Simulated control plane.
//!
//! `InMemoryClient` keeps studios in process memory and behaves like the real
//! API where it matters to reconciliation: identifiers are assigned on create,
//! immutable attributes are rejected on update, delete is idempotent, and
//! optionally new or deleted studios linger in a transient status for a few
//! reads. Tests use it to delete or modify studios out of band and to inject
//! one-shot faults.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::error::{RemoteError, Result};
use crate::resource::{
    ATTR_NAME, AttributeSchema, AttributeValue, ChangeSet, DesiredConfiguration, Mutability,
    ObservedState, RemoteStatus, ResourceId,
};

use super::client::RemoteClient;

/// Default region used in computed ARNs and URLs.
const DEFAULT_REGION: &str = "us-east-1";

/// Account id used in computed ARNs.
const ACCOUNT_ID: &str = "000000000000";

/// Remote call kinds, for fault injection and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    /// `create`
    Create,
    /// `read`
    Read,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `find_by_name`
    FindByName,
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let call = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::FindByName => "find_by_name",
        };
        write!(f, "{call}")
    }
}

/// A one-shot fault for the next call of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail without touching any studio, as if the connection dropped.
    Transport,
    /// Fail with a concurrent modification error.
    Conflict,
    /// Fail with an authentication error.
    Authentication,
    /// Perform the call, then hold the response back for the given time.
    Delay(Duration),
}

/// Number of calls received, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `create` calls.
    pub create: u32,
    /// `read` calls.
    pub read: u32,
    /// `update` calls.
    pub update: u32,
    /// `delete` calls.
    pub delete: u32,
    /// `find_by_name` calls.
    pub find_by_name: u32,
}

impl CallCounts {
    /// Total number of mutating calls.
    #[must_use]
    pub const fn mutations(&self) -> u32 {
        self.create + self.update + self.delete
    }

    fn bump(&mut self, call: Call) {
        match call {
            Call::Create => self.create += 1,
            Call::Read => self.read += 1,
            Call::Update => self.update += 1,
            Call::Delete => self.delete += 1,
            Call::FindByName => self.find_by_name += 1,
        }
    }
}

#[derive(Debug)]
struct StoredStudio {
    state: ObservedState,
    pending_reads: u32,
}

#[derive(Debug, Default)]
struct Inner {
    studios: BTreeMap<ResourceId, StoredStudio>,
    next_id: u64,
    faults: Vec<(Call, Fault)>,
    calls: CallCounts,
}

impl Inner {
    /// Returns the studio as a reader sees it, settling transient statuses
    /// once their pending reads are used up.
    fn observe(&mut self, id: &ResourceId) -> Option<ObservedState> {
        let entry = self.studios.get_mut(id)?;
        if entry.pending_reads > 0 {
            entry.pending_reads -= 1;
            return Some(entry.state.clone());
        }
        if entry.state.status == RemoteStatus::Deleting {
            self.studios.remove(id);
            return None;
        }
        entry.state.status = RemoteStatus::Available;
        Some(entry.state.clone())
    }
}

/// In-memory implementation of [`RemoteClient`].
#[derive(Debug)]
pub struct InMemoryClient {
    region: String,
    settle_reads: u32,
    schema: AttributeSchema,
    inner: Mutex<Inner>,
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryClient {
    /// Creates an empty control plane where every change settles immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            region: String::from(DEFAULT_REGION),
            settle_reads: 0,
            schema: AttributeSchema::studio(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Keeps created and deleted studios in `creating`/`deleting` for the
    /// given number of reads.
    #[must_use]
    pub const fn with_settle_reads(mut self, reads: u32) -> Self {
        self.settle_reads = reads;
        self
    }

    /// Sets the region used in computed attributes.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a fault for the next call of kind `call`.
    pub fn inject(&self, call: Call, fault: Fault) {
        self.lock().faults.push((call, fault));
    }

    /// Returns the call counters.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Returns the number of studios currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().studios.len()
    }

    /// Returns true if no studio is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().studios.is_empty()
    }

    /// Returns the stored state without settling it or counting a read.
    #[must_use]
    pub fn snapshot(&self, id: &ResourceId) -> Option<ObservedState> {
        self.lock().studios.get(id).map(|s| s.state.clone())
    }

    /// Deletes a studio behind the reconciler's back.
    pub fn delete_out_of_band(&self, id: &ResourceId) -> bool {
        let removed = self.lock().studios.remove(id).is_some();
        debug!("Out-of-band delete of {id}: {removed}");
        removed
    }

    /// Changes an attribute behind the reconciler's back.
    pub fn set_attribute_out_of_band(
        &self,
        id: &ResourceId,
        name: &str,
        value: AttributeValue,
    ) -> bool {
        let mut inner = self.lock();
        let Some(studio) = inner.studios.get_mut(id) else {
            return false;
        };
        studio.state.attributes.insert(name.to_string(), value);
        true
    }

    /// Sets a tag behind the reconciler's back.
    pub fn set_tag_out_of_band(&self, id: &ResourceId, key: &str, value: &str) -> bool {
        let mut inner = self.lock();
        let Some(studio) = inner.studios.get_mut(id) else {
            return false;
        };
        studio.state.tags.insert(key.to_string(), value.to_string());
        true
    }

    /// Counts the call and resolves any queued fault for it.
    ///
    /// Returns the response delay to apply after the call, if any.
    fn enter(&self, call: Call, resource: &str) -> Result<Option<Duration>> {
        let mut inner = self.lock();
        inner.calls.bump(call);

        let Some(pos) = inner.faults.iter().position(|(c, _)| *c == call) else {
            return Ok(None);
        };
        let (_, fault) = inner.faults.remove(pos);
        drop(inner);

        let operation = call.to_string();
        debug!("Injecting {fault:?} into {operation} of {resource}");
        match fault {
            Fault::Transport => Err(RemoteError::transport(
                operation,
                resource,
                "connection reset by peer",
            )
            .into()),
            Fault::Conflict => Err(RemoteError::conflict(
                operation,
                resource,
                "studio was modified concurrently",
            )
            .into()),
            Fault::Authentication => Err(RemoteError::Authentication {
                message: String::from("security token expired"),
            }
            .into()),
            Fault::Delay(delay) => Ok(Some(delay)),
        }
    }

    async fn respond<T>(delay: Option<Duration>, value: T) -> T {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        value
    }
}

#[async_trait]
impl RemoteClient for InMemoryClient {
    async fn create(&self, desired: &DesiredConfiguration) -> Result<ObservedState> {
        let name = desired.name().unwrap_or_default().to_string();
        let delay = self.enter(Call::Create, &name)?;

        let observed = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = ResourceId::new(format!("es-{:010}", inner.next_id));

            let mut state = ObservedState::present(id.clone());
            state.status = if self.settle_reads > 0 {
                RemoteStatus::Creating
            } else {
                RemoteStatus::Available
            };
            state.arn = Some(format!(
                "arn:aws:elasticmapreduce:{}:{ACCOUNT_ID}:studio/{id}",
                self.region
            ));
            state.url = Some(format!(
                "https://{id}.emrstudio-prod.{}.amazonaws.com",
                self.region
            ));
            state.attributes.clone_from(&desired.attributes);
            state.tags.clone_from(&desired.tags);

            inner.studios.insert(
                id,
                StoredStudio {
                    state: state.clone(),
                    pending_reads: self.settle_reads,
                },
            );
            state
        };

        debug!("Created studio {} ({name})", observed.id);
        Ok(Self::respond(delay, observed).await)
    }

    async fn read(&self, id: &ResourceId) -> Result<ObservedState> {
        let delay = self.enter(Call::Read, id.as_str())?;
        let observed = self.lock().observe(id);
        let result: Result<ObservedState> = observed.ok_or_else(|| RemoteError::not_found(id.as_str()).into());
        Self::respond(delay, result).await
    }

    async fn update(&self, id: &ResourceId, changes: &ChangeSet) -> Result<ObservedState> {
        let delay = self.enter(Call::Update, id.as_str())?;

        let immutable: Vec<&str> = changes
            .attribute_names()
            .into_iter()
            .filter(|name| self.schema.mutability(name) == Mutability::Immutable)
            .collect();
        if !immutable.is_empty() {
            return Err(RemoteError::api_error(
                400,
                format!("ValidationException: cannot modify {}", immutable.join(", ")),
            )
            .into());
        }

        let result: Result<ObservedState> = {
            let mut inner = self.lock();
            match inner.studios.get_mut(id) {
                None => Err(RemoteError::not_found(id.as_str()).into()),
                Some(studio) if studio.state.status == RemoteStatus::Deleting => {
                    Err(RemoteError::conflict("update", id.as_str(), "studio is being deleted").into())
                }
                Some(studio) => {
                    for (name, value) in &changes.attributes {
                        match value {
                            Some(value) => {
                                studio.state.attributes.insert(name.clone(), value.clone());
                            }
                            None => {
                                studio.state.attributes.remove(name);
                            }
                        }
                    }
                    changes.tags.apply_to(&mut studio.state.tags);
                    if self.settle_reads > 0 {
                        studio.state.status = RemoteStatus::Updating;
                        studio.pending_reads = self.settle_reads;
                    }
                    Ok(studio.state.clone())
                }
            }
        };

        Self::respond(delay, result).await
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        let delay = self.enter(Call::Delete, id.as_str())?;

        {
            let mut inner = self.lock();
            if self.settle_reads == 0 {
                inner.studios.remove(id);
            } else if let Some(studio) = inner.studios.get_mut(id) {
                if studio.state.status != RemoteStatus::Deleting {
                    studio.state.status = RemoteStatus::Deleting;
                    studio.pending_reads = self.settle_reads;
                }
            }
        }

        Self::respond(delay, Ok(())).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ObservedState>> {
        let delay = self.enter(Call::FindByName, name)?;

        let found = {
            let mut inner = self.lock();
            let candidates: Vec<ResourceId> = inner
                .studios
                .iter()
                .filter(|(_, s)| {
                    s.state.attribute(ATTR_NAME).and_then(AttributeValue::as_text) == Some(name)
                })
                .map(|(id, _)| id.clone())
                .collect();
            candidates.iter().find_map(|id| inner.observe(id))
        };

        Ok(Self::respond(delay, found).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ATTR_AUTH_MODE, ATTR_DESCRIPTION, TagDiff};

    fn desired(name: &str) -> DesiredConfiguration {
        DesiredConfiguration::new()
            .with_attribute(ATTR_NAME, AttributeValue::text(name))
            .with_attribute(ATTR_AUTH_MODE, AttributeValue::text("IAM"))
            .with_tag("key1", "value1")
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_computed_attributes() {
        let client = InMemoryClient::new();
        let observed = client.create(&desired("analytics")).await.unwrap();

        assert!(observed.exists);
        assert!(observed.id.as_str().starts_with("es-"));
        assert!(observed.arn.as_deref().unwrap().ends_with(&format!("studio/{}", observed.id)));
        assert!(observed.url.is_some());
        assert_eq!(client.calls().create, 1);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let client = InMemoryClient::new();
        let err = client.read(&ResourceId::new("es-missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let client = InMemoryClient::new();
        let observed = client.create(&desired("analytics")).await.unwrap();

        client.delete(&observed.id).await.unwrap();
        client.delete(&observed.id).await.unwrap();
        assert!(client.read(&observed.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_settle_reads() {
        let client = InMemoryClient::new().with_settle_reads(1);
        let created = client.create(&desired("analytics")).await.unwrap();
        assert_eq!(created.status, RemoteStatus::Creating);

        assert_eq!(client.read(&created.id).await.unwrap().status, RemoteStatus::Creating);
        assert_eq!(client.read(&created.id).await.unwrap().status, RemoteStatus::Available);

        let changes = ChangeSet::new().set(ATTR_DESCRIPTION, AttributeValue::text("notebooks"));
        let updated = client.update(&created.id, &changes).await.unwrap();
        assert_eq!(updated.status, RemoteStatus::Updating);
        assert_eq!(client.read(&created.id).await.unwrap().status, RemoteStatus::Updating);
        assert_eq!(client.read(&created.id).await.unwrap().status, RemoteStatus::Available);

        client.delete(&created.id).await.unwrap();
        assert_eq!(client.read(&created.id).await.unwrap().status, RemoteStatus::Deleting);
        assert!(client.read(&created.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_rejects_immutable_attribute() {
        let client = InMemoryClient::new();
        let created = client.create(&desired("analytics")).await.unwrap();

        let changes = ChangeSet::new().set(ATTR_AUTH_MODE, AttributeValue::text("SSO"));
        let err = client.update(&created.id, &changes).await.unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_applies_tag_diff() {
        let client = InMemoryClient::new();
        let created = client.create(&desired("analytics")).await.unwrap();

        let mut wanted = created.tags.clone();
        wanted.insert(String::from("key2"), String::from("value2"));
        wanted.remove("key1");
        let changes = ChangeSet::new().with_tags(TagDiff::compute(&created.tags, &wanted));

        let updated = client.update(&created.id, &changes).await.unwrap();
        assert_eq!(updated.tags, wanted);
    }

    #[tokio::test]
    async fn test_injected_fault_is_one_shot() {
        let client = InMemoryClient::new();
        client.inject(Call::Create, Fault::Transport);

        let err = client.create(&desired("analytics")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(client.is_empty());

        client.create(&desired("analytics")).await.unwrap();
        assert_eq!(client.len(), 1);
        assert_eq!(client.calls().create, 2);
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let client = InMemoryClient::new();
        let created = client.create(&desired("analytics")).await.unwrap();

        let found = client.find_by_name("analytics").await.unwrap();
        assert_eq!(found.map(|s| s.id), Some(created.id));
        assert!(client.find_by_name("other").await.unwrap().is_none());
    }
}
