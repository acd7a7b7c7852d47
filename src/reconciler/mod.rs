//! Reconciler for one studio.
//!
//! A [`Reconciler`] owns the [`ResourceRecord`] of a single studio and is
//! driven by one task at a time; every mutating method takes `&mut self`.
//! It refreshes the observed state, detects drift, plans the minimal set of
//! operations and executes them, re-reading and replanning when the remote
//! reports a conflicting modification.

mod drift;
mod fleet;

pub use drift::Drift;
pub use fleet::{DriftReport, ProjectReconciler, ReconciliationResult};

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ConfigHasher;
use crate::error::{ReconcileError, RemoteError, Result};
use crate::planner::{
    DEFAULT_OPERATION_TIMEOUT, DiffEngine, PlanExecutor, ReconciliationPlan,
};
use crate::remote::{RemoteClient, WaitPolicy, wait_for_absence, wait_until_stable};
use crate::resource::{
    DesiredConfiguration, InFlightRegistry, LifecycleState, Mutation, ObservedState, RemoteStatus,
    ResourceId,
};
use crate::state::ResourceRecord;

/// Default number of plan-and-execute rounds in [`Reconciler::apply`].
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Reconciler for a single studio.
pub struct Reconciler<C: RemoteClient + ?Sized> {
    client: Arc<C>,
    record: ResourceRecord,
    diff_engine: DiffEngine,
    hasher: ConfigHasher,
    inflight: Arc<InFlightRegistry>,
    timeout: Duration,
    wait: WaitPolicy,
    max_attempts: u32,
    last_plan: Option<ReconciliationPlan>,
}

/// What a refresh found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Current remote snapshot, or `None` if the studio does not exist.
    pub observed: Option<ObservedState>,
    /// Out-of-band change detected since the previous snapshot.
    pub drift: Option<Drift>,
}

/// Result of [`Reconciler::apply`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyOutcome {
    /// Mutations that completed, in order.
    pub operations: Vec<Mutation>,
    /// Drift seen while refreshing.
    pub drift: Vec<Drift>,
    /// Final observed state.
    pub observed: Option<ObservedState>,
    /// Plan-and-execute rounds used.
    pub attempts: u32,
}

impl<C: RemoteClient + ?Sized> Reconciler<C> {
    /// Creates a reconciler for a studio that is not tracked yet.
    #[must_use]
    pub fn new(name: &str, client: Arc<C>) -> Self {
        Self {
            client,
            record: ResourceRecord::new(name),
            diff_engine: DiffEngine::new(),
            hasher: ConfigHasher::new(),
            inflight: InFlightRegistry::new(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
            wait: WaitPolicy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            last_plan: None,
        }
    }

    /// Resumes from a persisted record.
    #[must_use]
    pub fn with_record(mut self, record: ResourceRecord) -> Self {
        self.record = record;
        self
    }

    /// Sets the bound on each remote call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the polling policy for transient remote states.
    #[must_use]
    pub const fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Sets the maximum plan-and-execute rounds in `apply`.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Shares an in-flight registry with other reconcilers.
    #[must_use]
    pub fn with_inflight(mut self, inflight: Arc<InFlightRegistry>) -> Self {
        self.inflight = inflight;
        self
    }

    /// Returns the logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Returns the record.
    #[must_use]
    pub const fn record(&self) -> &ResourceRecord {
        &self.record
    }

    /// Consumes the reconciler, returning its record.
    #[must_use]
    pub fn into_record(self) -> ResourceRecord {
        self.record
    }

    /// Returns the plan computed by the last `reconcile`.
    #[must_use]
    pub const fn current_plan(&self) -> Option<&ReconciliationPlan> {
        self.last_plan.as_ref()
    }

    /// Computes the plan that moves `observed` to `desired`.
    ///
    /// Makes no remote calls.
    ///
    /// # Errors
    ///
    /// Returns `ImmutableAttributeConflict` if an immutable attribute differs.
    pub fn reconcile(
        &mut self,
        desired: &DesiredConfiguration,
        observed: Option<&ObservedState>,
    ) -> Result<ReconciliationPlan> {
        let diff = self.diff_engine.compute(&self.record.name, desired, observed);
        let hash = self.hasher.hash_desired(desired);
        let plan = ReconciliationPlan::from_diff(&diff, desired, &hash)?;

        debug!("{plan}");
        self.last_plan = Some(plan.clone());
        Ok(plan)
    }

    /// Reads a studio by identifier.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist. Transport and authentication
    /// failures propagate unchanged, and a read that outlives the timeout is
    /// reported as a transport failure.
    pub async fn find_by_id(&self, id: &ResourceId) -> Result<ObservedState> {
        self.bounded_read("read", id.as_str(), self.client.read(id)).await
    }

    /// Brings the record up to date with the remote side.
    ///
    /// A pending mutation left by an earlier timeout is resolved first: a
    /// create is looked up by name, other mutations by identifier. A studio
    /// read in a transient status is polled until it settles or disappears.
    ///
    /// # Errors
    ///
    /// Propagates every remote failure other than not-found.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome> {
        if let Some(pending) = self.record.pending() {
            self.resolve_pending(pending).await?;
        }

        let Some(id) = self.record.id.clone() else {
            debug!("{}: not tracked, nothing to refresh", self.record.name);
            return Ok(RefreshOutcome::default());
        };

        if let Some(current) = self.read_settled(&id).await? {
            let drift = self
                .record
                .observed
                .as_ref()
                .and_then(|previous| Drift::between(previous, &current));
            if let Some(drift) = &drift {
                warn!("{}: {drift}", self.record.name);
            }
            self.record.track(current.clone());
            Ok(RefreshOutcome {
                observed: Some(current),
                drift,
            })
        } else {
            let drift = Drift::ExternallyDeleted { id };
            warn!("{}: {drift}", self.record.name);
            self.record.clear();
            Ok(RefreshOutcome {
                observed: None,
                drift: Some(drift),
            })
        }
    }

    /// Reads a studio and polls through any transient status.
    ///
    /// Returns `None` if the studio is absent, including one that was
    /// deleting when first read.
    async fn read_settled(&self, id: &ResourceId) -> Result<Option<ObservedState>> {
        let observed = match self.find_by_id(id).await {
            Ok(observed) => observed,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        match observed.status {
            RemoteStatus::Deleting => {
                debug!("{}: {id} is deleting, waiting for it to go", self.record.name);
                wait_for_absence(&*self.client, id, &self.wait).await?;
                Ok(None)
            }
            status if status.is_transient() => {
                debug!("{}: {id} is {status}, waiting", self.record.name);
                match wait_until_stable(&*self.client, id, &self.wait).await {
                    Ok(stable) => Ok(Some(stable)),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            }
            _ => Ok(Some(observed)),
        }
    }

    async fn resolve_pending(&mut self, pending: Mutation) -> Result<()> {
        info!("{}: resolving unknown outcome of {pending}", self.record.name);

        match (pending, self.record.id.clone()) {
            (Mutation::Create, None) => {
                let name = self
                    .record
                    .remote_name
                    .clone()
                    .unwrap_or_else(|| self.record.name.clone());
                let found = self
                    .bounded_read("find_by_name", &name, self.client.find_by_name(&name))
                    .await?;
                match found {
                    Some(observed) => {
                        info!("{}: create had succeeded as {}", self.record.name, observed.id);
                        self.record.track(observed);
                    }
                    None => {
                        info!("{}: create never happened", self.record.name);
                        self.record.set_lifecycle(LifecycleState::Absent);
                    }
                }
            }
            (Mutation::Delete, Some(id)) => match self.read_settled(&id).await? {
                Some(observed) => {
                    info!("{}: delete of {id} did not take effect", self.record.name);
                    self.record.track(observed);
                }
                None => self.record.clear(),
            },
            // An interrupted update leaves the studio in place; the refresh
            // that follows reads whatever it ended up as.
            (_, Some(_)) => self.record.set_lifecycle(LifecycleState::Present),
            (_, None) => self.record.set_lifecycle(LifecycleState::Absent),
        }
        Ok(())
    }

    /// Refreshes, plans and executes until `desired` holds.
    ///
    /// A conflicting modification or a studio vanishing mid-update triggers
    /// a re-read and a new plan, up to the configured number of attempts.
    /// Create is never retried blindly.
    ///
    /// # Errors
    ///
    /// Returns `ImmutableAttributeConflict`, `MaxRetriesExceeded`,
    /// `UnknownOutcome` or any remote failure.
    pub async fn apply(&mut self, desired: &DesiredConfiguration) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();

        for attempt in 1..=self.max_attempts {
            outcome.attempts = attempt;
            debug!("{}: apply attempt {attempt}/{}", self.record.name, self.max_attempts);

            let refreshed = self.refresh().await?;
            outcome.drift.extend(refreshed.drift);

            let plan = self.reconcile(desired, refreshed.observed.as_ref())?;
            if plan.is_empty() {
                self.record.config_hash = Some(plan.config_hash);
                outcome.observed = refreshed.observed;
                info!("{}: up to date", self.record.name);
                return Ok(outcome);
            }

            let executor = PlanExecutor::new(&*self.client, &self.inflight)
                .with_timeout(self.timeout)
                .with_wait_policy(self.wait);

            match executor.execute(&plan, &mut self.record).await {
                Ok(result) => {
                    outcome.operations.extend(result.applied);
                    outcome.observed.clone_from(&self.record.observed);
                    return Ok(outcome);
                }
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    warn!("{}: attempt {attempt} failed, replanning: {e}", self.record.name);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ReconcileError::MaxRetriesExceeded {
            attempts: self.max_attempts,
            resource: self.record.name.clone(),
        }
        .into())
    }

    /// Deletes the studio and waits until it is gone.
    ///
    /// Returns `false` if there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns any remote failure, or `WaitTimeout` if the studio is still
    /// visible when polling gives up.
    pub async fn destroy(&mut self) -> Result<bool> {
        self.refresh().await?;

        let Some(id) = self.record.id.clone() else {
            info!("{}: nothing to destroy", self.record.name);
            return Ok(false);
        };

        let plan = ReconciliationPlan::destroy(&self.record.name, id);
        self.last_plan = Some(plan.clone());

        PlanExecutor::new(&*self.client, &self.inflight)
            .with_timeout(self.timeout)
            .with_wait_policy(self.wait)
            .execute(&plan, &mut self.record)
            .await?;
        Ok(true)
    }

    /// Adopts an existing studio by identifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the record already tracks a different
    /// studio, and `NotFound` if `id` does not exist.
    pub async fn import(&mut self, id: &ResourceId) -> Result<ObservedState> {
        if let Some(current) = self.record.id.as_ref().filter(|current| *current != id) {
            return Err(ReconcileError::InvalidTransition {
                resource: self.record.name.clone(),
                state: format!("tracking {current}"),
                operation: String::from("import"),
            }
            .into());
        }

        let observed = self.find_by_id(id).await?;
        info!("{}: imported {id}", self.record.name);
        self.record.track(observed.clone());
        Ok(observed)
    }

    async fn bounded_read<T, F>(&self, operation: &str, resource: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, call).await.map_err(|_| {
            RemoteError::transport(
                operation,
                resource,
                format!("no response within {:?}", self.timeout),
            )
        })?
    }
}

impl std::fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.operations.is_empty() {
            write!(f, "no changes")?;
        } else {
            let ops: Vec<String> = self.operations.iter().map(ToString::to_string).collect();
            write!(f, "{}", ops.join(", "))?;
        }
        if self.attempts > 1 {
            write!(f, " after {} attempts", self.attempts)?;
        }
        for drift in &self.drift {
            write!(f, "; {drift}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StudioError;
    use crate::remote::{Call, Fault, InMemoryClient, MockRemoteClient};
    use crate::resource::{ATTR_AUTH_MODE, ATTR_DESCRIPTION, ATTR_NAME, AttributeValue, ChangeSet};

    fn desired() -> DesiredConfiguration {
        DesiredConfiguration::new()
            .with_attribute(ATTR_NAME, AttributeValue::text("analytics"))
            .with_attribute(ATTR_AUTH_MODE, AttributeValue::text("IAM"))
            .with_tag("team", "data")
    }

    fn reconciler(client: &Arc<InMemoryClient>) -> Reconciler<InMemoryClient> {
        Reconciler::new("main", Arc::clone(client))
            .with_wait_policy(WaitPolicy::fast(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let client = Arc::new(InMemoryClient::new());
        let mut rec = reconciler(&client);

        let first = rec.apply(&desired()).await.unwrap();
        assert_eq!(first.operations, vec![Mutation::Create]);

        let before = client.calls().mutations();
        let second = rec.apply(&desired()).await.unwrap();
        assert!(second.operations.is_empty());
        assert_eq!(client.calls().mutations(), before);
        assert!(rec.current_plan().is_some_and(ReconciliationPlan::is_empty));
    }

    #[tokio::test]
    async fn test_conflict_is_retried_after_reread() {
        let client = Arc::new(InMemoryClient::new());
        let mut rec = reconciler(&client);
        rec.apply(&desired()).await.unwrap();

        client.inject(Call::Update, Fault::Conflict);
        let changed = desired().with_attribute(ATTR_DESCRIPTION, AttributeValue::text("new"));
        let outcome = rec.apply(&changed).await.unwrap();

        assert_eq!(outcome.operations, vec![Mutation::Update]);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(client.calls().update, 2);
    }

    #[tokio::test]
    async fn test_persistent_conflict_exhausts_attempts() {
        let client = Arc::new(InMemoryClient::new());
        let mut rec = reconciler(&client).with_max_attempts(2);
        rec.apply(&desired()).await.unwrap();

        client.inject(Call::Update, Fault::Conflict);
        client.inject(Call::Update, Fault::Conflict);
        let changed = desired().with_attribute(ATTR_DESCRIPTION, AttributeValue::text("new"));
        let err = rec.apply(&changed).await.unwrap_err();
        assert!(matches!(
            err,
            StudioError::Reconcile(ReconcileError::MaxRetriesExceeded { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_reports_external_deletion() {
        let client = Arc::new(InMemoryClient::new());
        let mut rec = reconciler(&client);
        rec.apply(&desired()).await.unwrap();
        let id = rec.record().id.clone().unwrap();

        assert!(client.delete_out_of_band(&id));
        let refreshed = rec.refresh().await.unwrap();
        assert_eq!(refreshed.drift, Some(Drift::ExternallyDeleted { id }));
        assert!(refreshed.observed.is_none());

        let plan = rec.reconcile(&desired(), None).unwrap();
        assert_eq!(plan.mutations(), vec![Mutation::Create]);
    }

    #[tokio::test]
    async fn test_unknown_create_is_resolved_by_name() {
        let client = Arc::new(InMemoryClient::new());
        client.inject(Call::Create, Fault::Delay(Duration::from_millis(500)));
        let mut rec = reconciler(&client).with_timeout(Duration::from_millis(20));

        let err = rec.apply(&desired()).await.unwrap_err();
        assert!(matches!(err, StudioError::Reconcile(ReconcileError::UnknownOutcome { .. })));
        assert_eq!(rec.record().pending(), Some(Mutation::Create));

        let outcome = rec.apply(&desired()).await.unwrap();
        assert!(outcome.operations.is_empty());
        assert_eq!(client.calls().create, 1);
        assert_eq!(client.calls().find_by_name, 1);
        assert_eq!(client.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_twice() {
        let client = Arc::new(InMemoryClient::new().with_settle_reads(1));
        let mut rec = reconciler(&client);
        rec.apply(&desired()).await.unwrap();

        assert!(rec.destroy().await.unwrap());
        assert!(client.is_empty());
        assert!(!rec.destroy().await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_delete_on_updating_studio_keeps_it() {
        let client = Arc::new(InMemoryClient::new().with_settle_reads(1));
        let mut rec = reconciler(&client);
        rec.apply(&desired()).await.unwrap();
        let id = rec.record().id.clone().unwrap();

        let edit = ChangeSet::new().set(ATTR_DESCRIPTION, AttributeValue::text("edited"));
        client.update(&id, &edit).await.unwrap();

        let mut record = rec.into_record();
        record.set_lifecycle(LifecycleState::Deleting);
        let mut rec = Reconciler::new("main", Arc::clone(&client))
            .with_record(record)
            .with_wait_policy(WaitPolicy::fast(Duration::from_millis(200)));

        let refreshed = rec.refresh().await.unwrap();
        assert_eq!(rec.record().lifecycle, LifecycleState::Present);
        assert_eq!(rec.record().id, Some(id));
        let observed = refreshed.observed.unwrap();
        assert_eq!(observed.status, RemoteStatus::Available);
        assert_eq!(
            observed.attribute(ATTR_DESCRIPTION).and_then(AttributeValue::as_text),
            Some("edited")
        );
        assert_eq!(client.len(), 1);
    }

    #[tokio::test]
    async fn test_import_refuses_a_different_id() {
        let client = Arc::new(InMemoryClient::new());
        let mut rec = reconciler(&client);
        rec.apply(&desired()).await.unwrap();

        let err = rec.import(&ResourceId::new("es-9999999999")).await.unwrap_err();
        assert!(matches!(err, StudioError::Reconcile(ReconcileError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_read_failure_propagates_and_keeps_record() {
        let mut mock = MockRemoteClient::new();
        mock.expect_read().times(1).returning(|_| {
            Err(RemoteError::Authentication {
                message: String::from("token expired"),
            }
            .into())
        });

        let mut record = ResourceRecord::new("main");
        record.track(ObservedState::present(ResourceId::new("es-1")));
        let mut rec = Reconciler::new("main", Arc::new(mock)).with_record(record.clone());

        let err = rec.refresh().await.unwrap_err();
        assert!(matches!(err, StudioError::Remote(RemoteError::Authentication { .. })));
        assert_eq!(rec.record().id, record.id);
        assert_eq!(rec.record().lifecycle, LifecycleState::Present);
    }

    #[tokio::test]
    async fn test_create_failure_is_not_retried() {
        let mut mock = MockRemoteClient::new();
        mock.expect_create()
            .times(1)
            .returning(|_| Err(RemoteError::api_error(500, "internal").into()));

        let mut rec = Reconciler::new("main", Arc::new(mock));
        let err = rec.apply(&desired()).await.unwrap_err();
        assert!(matches!(err, StudioError::Remote(RemoteError::Api { status: 500, .. })));
        assert_eq!(rec.record().lifecycle, LifecycleState::Absent);
    }
}
