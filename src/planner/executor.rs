//! Plan executor.
//!
//! Runs the operations of a [`ReconciliationPlan`] against a remote client
//! and drives the record's lifecycle state machine alongside. Every remote
//! mutation is bounded by a timeout. A mutation that times out leaves the
//! record in its transient state so the next run resolves it by lookup
//! instead of repeating it blindly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, Result};
use crate::remote::{RemoteClient, WaitPolicy, wait_for_absence, wait_until_stable};
use crate::resource::{
    ChangeSet, DesiredConfiguration, InFlightRegistry, Mutation, ObservedState, ResourceId,
};
use crate::state::ResourceRecord;

use super::plan::{Operation, ReconciliationPlan};

/// Default bound on a single remote mutation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Executor for reconciliation plans.
pub struct PlanExecutor<'a, C: RemoteClient + ?Sized> {
    client: &'a C,
    registry: &'a Arc<InFlightRegistry>,
    timeout: Duration,
    wait: WaitPolicy,
}

/// Result of executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Mutations that completed, in order.
    pub applied: Vec<Mutation>,
}

impl<'a, C: RemoteClient + ?Sized> PlanExecutor<'a, C> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(client: &'a C, registry: &'a Arc<InFlightRegistry>) -> Self {
        Self {
            client,
            registry,
            timeout: DEFAULT_OPERATION_TIMEOUT,
            wait: WaitPolicy::default(),
        }
    }

    /// Sets the bound on each remote mutation.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the polling policy used after create, update and delete.
    #[must_use]
    pub const fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Executes a plan, updating `record` as operations complete.
    ///
    /// # Errors
    ///
    /// Stops at the first failing operation and returns its error. The
    /// record reflects everything that completed before it.
    pub async fn execute(
        &self,
        plan: &ReconciliationPlan,
        record: &mut ResourceRecord,
    ) -> Result<ExecutionResult> {
        if plan.is_empty() {
            debug!("{}: nothing to execute", plan.resource);
            return Ok(ExecutionResult::default());
        }

        info!("Executing plan for {} with {} operation(s)", plan.resource, plan.len());

        let mut result = ExecutionResult::default();
        for op in &plan.operations {
            match op {
                Operation::Create(desired) => self.create(desired, record).await?,
                Operation::Update(changes) => self.update(changes, record).await?,
                Operation::Delete(id) => self.delete(id, record).await?,
            }
            if op.mutation() != Mutation::Delete {
                record.config_hash = Some(plan.config_hash.clone());
            }
            result.applied.push(op.mutation());
        }

        info!("{}: {result}", plan.resource);
        Ok(result)
    }

    async fn create(&self, desired: &DesiredConfiguration, record: &mut ResourceRecord) -> Result<()> {
        let remote_name = desired.name().unwrap_or(record.name.as_str()).to_string();
        let _guard = self.registry.acquire(&format!("name:{remote_name}"), Mutation::Create)?;

        let next = record.lifecycle.begin(Mutation::Create, &record.name)?;
        record.set_lifecycle(next);
        record.remote_name = Some(remote_name);

        let created = self
            .bounded(Mutation::Create, record, self.client.create(desired))
            .await?;
        info!("Created studio {} (ID: {})", record.name, created.id);

        let id = created.id.clone();
        record.track(created);
        self.settle(&id, record).await
    }

    async fn update(&self, changes: &ChangeSet, record: &mut ResourceRecord) -> Result<()> {
        let id = record.id.clone().ok_or_else(|| ReconcileError::InvalidTransition {
            resource: record.name.clone(),
            state: record.lifecycle.to_string(),
            operation: Mutation::Update.to_string(),
        })?;
        let _guard = self.registry.acquire(id.as_str(), Mutation::Update)?;

        let next = record.lifecycle.begin(Mutation::Update, &record.name)?;
        record.set_lifecycle(next);

        let updated = match self
            .bounded(Mutation::Update, record, self.client.update(&id, changes))
            .await
        {
            Err(e) if e.is_not_found() => {
                warn!("Studio {} ({id}) disappeared during update", record.name);
                record.clear();
                return Err(e);
            }
            other => other?,
        };
        info!("Updated studio {} ({id}): {changes}", record.name);

        record.track(updated);
        self.settle(&id, record).await
    }

    async fn delete(&self, id: &ResourceId, record: &mut ResourceRecord) -> Result<()> {
        let _guard = self.registry.acquire(id.as_str(), Mutation::Delete)?;

        let next = record.lifecycle.begin(Mutation::Delete, &record.name)?;
        record.set_lifecycle(next);

        self.bounded(Mutation::Delete, record, self.client.delete(id))
            .await?;

        // The call was accepted; if polling gives up the record stays in
        // `deleting` and the next refresh settles it.
        wait_for_absence(self.client, id, &self.wait).await?;

        info!("Deleted studio {} (ID: {id})", record.name);
        record.clear();
        Ok(())
    }

    /// Waits out a transient remote status after create or update.
    async fn settle(&self, id: &ResourceId, record: &mut ResourceRecord) -> Result<()> {
        if record.observed.as_ref().is_some_and(|o| o.status.is_transient()) {
            let stable: ObservedState = wait_until_stable(self.client, id, &self.wait).await?;
            record.track(stable);
        }
        Ok(())
    }

    /// Runs one remote mutation under the operation timeout.
    ///
    /// A definite failure rolls the lifecycle back to its previous terminal
    /// state. A timeout leaves it transient.
    async fn bounded<T, F>(&self, mutation: Mutation, record: &mut ResourceRecord, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("{mutation} of {} failed: {e}", record.name);
                record.set_lifecycle(record.lifecycle.fail());
                Err(e)
            }
            Err(_) => {
                warn!(
                    "{mutation} of {} timed out after {:?}, outcome unknown",
                    record.name, self.timeout
                );
                Err(ReconcileError::UnknownOutcome {
                    resource: record.name.clone(),
                    operation: mutation.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
                .into())
            }
        }
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ops: Vec<String> = self.applied.iter().map(ToString::to_string).collect();
        write!(f, "applied {} operation(s)", ops.len())?;
        if !ops.is_empty() {
            write!(f, ": {}", ops.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StudioError;
    use crate::planner::DiffEngine;
    use crate::remote::{Call, Fault, InMemoryClient};
    use crate::resource::{ATTR_NAME, AttributeValue, LifecycleState};

    fn desired() -> DesiredConfiguration {
        DesiredConfiguration::new()
            .with_attribute(ATTR_NAME, AttributeValue::text("analytics"))
            .with_tag("team", "data")
    }

    fn create_plan() -> ReconciliationPlan {
        let diff = DiffEngine::new().compute("main", &desired(), None);
        ReconciliationPlan::from_diff(&diff, &desired(), "hash-1").unwrap()
    }

    fn fast() -> WaitPolicy {
        WaitPolicy::fast(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let client = InMemoryClient::new().with_settle_reads(1);
        let registry = InFlightRegistry::new();
        let executor = PlanExecutor::new(&client, &registry).with_wait_policy(fast());
        let mut record = ResourceRecord::new("main");

        let result = executor.execute(&create_plan(), &mut record).await.unwrap();
        assert_eq!(result.applied, vec![Mutation::Create]);
        assert_eq!(record.lifecycle, LifecycleState::Present);
        assert_eq!(record.config_hash.as_deref(), Some("hash-1"));
        assert_eq!(record.remote_name.as_deref(), Some("analytics"));

        let id = record.id.clone().unwrap();
        let plan = ReconciliationPlan::destroy("main", id.clone());
        executor.execute(&plan, &mut record).await.unwrap();
        assert!(record.is_untracked());
        assert!(client.snapshot(&id).is_none());
    }

    #[tokio::test]
    async fn test_failed_create_returns_to_absent() {
        let client = InMemoryClient::new();
        client.inject(Call::Create, Fault::Transport);
        let registry = InFlightRegistry::new();
        let executor = PlanExecutor::new(&client, &registry);
        let mut record = ResourceRecord::new("main");

        let err = executor.execute(&create_plan(), &mut record).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(record.lifecycle, LifecycleState::Absent);
        assert!(registry.current("name:analytics").is_none());
    }

    #[tokio::test]
    async fn test_timed_out_create_stays_pending() {
        let client = InMemoryClient::new();
        client.inject(Call::Create, Fault::Delay(Duration::from_millis(500)));
        let registry = InFlightRegistry::new();
        let executor = PlanExecutor::new(&client, &registry).with_timeout(Duration::from_millis(20));
        let mut record = ResourceRecord::new("main");

        let err = executor.execute(&create_plan(), &mut record).await.unwrap_err();
        assert!(matches!(err, StudioError::Reconcile(ReconcileError::UnknownOutcome { .. })));
        assert_eq!(record.pending(), Some(Mutation::Create));
        assert!(record.id.is_none());
        // The remote side did create it.
        assert_eq!(client.len(), 1);
    }

    #[tokio::test]
    async fn test_busy_identifier_is_refused() {
        let client = InMemoryClient::new();
        let registry = InFlightRegistry::new();
        let executor = PlanExecutor::new(&client, &registry);
        let mut record = ResourceRecord::new("main");
        executor.execute(&create_plan(), &mut record).await.unwrap();

        let id = record.id.clone().unwrap();
        let _held = registry.acquire(id.as_str(), Mutation::Update).unwrap();

        let plan = ReconciliationPlan::destroy("main", id);
        let err = executor.execute(&plan, &mut record).await.unwrap_err();
        assert!(matches!(err, StudioError::Reconcile(ReconcileError::OperationInProgress { .. })));
        assert_eq!(record.lifecycle, LifecycleState::Present);
    }
}
