//! Reconciliation of every studio in a deployment file.
//!
//! Each studio gets its own [`Reconciler`] on its own task. Tasks share only
//! the remote client and the in-flight registry, so a failure in one studio
//! never blocks the others.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::DeployConfig;
use crate::error::{ConfigError, Result, StudioError};
use crate::planner::ReconciliationPlan;
use crate::remote::{RemoteClient, WaitPolicy};
use crate::resource::{DesiredConfiguration, InFlightRegistry, Mutation};
use crate::state::{HistoryEntry, HistoryOperation, ResourceRecord, WorkspaceState};

use super::{ApplyOutcome, Drift, Reconciler};

/// Reconciler for all studios of a project.
pub struct ProjectReconciler<'a, C: RemoteClient + ?Sized + 'static> {
    config: &'a DeployConfig,
    client: Arc<C>,
    inflight: Arc<InFlightRegistry>,
    timeout: Duration,
    wait: WaitPolicy,
    max_attempts: u32,
}

/// Result of a project-wide run.
#[derive(Debug, Default, Serialize)]
pub struct ReconciliationResult {
    /// Whether every studio succeeded.
    pub success: bool,
    /// Studios created.
    pub created: usize,
    /// Studios updated in place.
    pub updated: usize,
    /// Studios deleted.
    pub deleted: usize,
    /// Studios already converged.
    pub unchanged: usize,
    /// Out-of-band changes seen, as `studio: drift`.
    pub drift: Vec<String>,
    /// Errors, as `studio: error`.
    pub errors: Vec<String>,
}

/// Report of a drift check.
#[derive(Debug, Default, Serialize)]
pub struct DriftReport {
    /// Whether anything needs to change.
    pub has_drift: bool,
    /// Studios whose plan is not empty.
    pub drifted_resources: Vec<String>,
    /// Out-of-band changes, as `studio: drift`.
    pub changes: Vec<String>,
    /// Records in the state with no studio in the configuration.
    pub orphaned: Vec<String>,
    /// Studios that could not be checked, as `studio: error`.
    pub errors: Vec<String>,
    /// Number of studios in the configuration.
    pub total_resources: usize,
}

impl<'a, C: RemoteClient + ?Sized + 'static> ProjectReconciler<'a, C> {
    /// Creates a project reconciler using the configured timeouts.
    #[must_use]
    pub fn new(config: &'a DeployConfig, client: Arc<C>) -> Self {
        Self {
            config,
            client,
            inflight: InFlightRegistry::new(),
            timeout: config.remote.operation_timeout(),
            wait: WaitPolicy::from(&config.waiter),
            max_attempts: config.remote.max_attempts,
        }
    }

    /// Overrides the polling policy.
    #[must_use]
    pub const fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn reconciler(&self, record: ResourceRecord) -> Reconciler<C> {
        Reconciler::new(&record.name, Arc::clone(&self.client))
            .with_record(record)
            .with_inflight(Arc::clone(&self.inflight))
            .with_timeout(self.timeout)
            .with_wait_policy(self.wait)
            .with_max_attempts(self.max_attempts)
    }

    fn record_for(state: &WorkspaceState, key: &str) -> ResourceRecord {
        state
            .get(key)
            .cloned()
            .unwrap_or_else(|| ResourceRecord::new(key))
    }

    /// Applies every studio in the configuration, in parallel.
    ///
    /// Records in `state` are updated even for studios that failed, so a
    /// pending unknown outcome survives to the next run.
    pub async fn apply(&self, state: &mut WorkspaceState) -> ReconciliationResult {
        info!(
            "Applying {} studio(s) for {}",
            self.config.studios.len(),
            self.config.qualified_name()
        );

        let mut tasks = JoinSet::new();
        for studio in &self.config.studios {
            let desired = DesiredConfiguration::from(studio);
            let mut reconciler = self.reconciler(Self::record_for(state, &studio.key));
            tasks.spawn(async move {
                let outcome = reconciler.apply(&desired).await;
                (reconciler.into_record(), outcome)
            });
        }

        let mut result = ReconciliationResult::default();
        let mut touched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (record, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!("Studio task failed: {e}");
                    result.errors.push(format!("task: {e}"));
                    continue;
                }
            };
            let name = record.name.clone();
            match outcome {
                Ok(outcome) => result.record_outcome(&name, &outcome),
                Err(e) => {
                    warn!("{name}: {e}");
                    result.errors.push(format!("{name}: {e}"));
                }
            }
            touched.push(name);
            state.set(record);
        }

        result.success = result.errors.is_empty();
        touched.sort();
        state.add_history(Self::history(HistoryOperation::Apply, touched, &result));
        result
    }

    /// Destroys every studio tracked in `state`.
    pub async fn destroy(&self, state: &mut WorkspaceState) -> ReconciliationResult {
        let names: Vec<String> = state.studio_names().into_iter().map(String::from).collect();
        info!("Destroying {} studio(s)", names.len());

        let mut tasks = JoinSet::new();
        for name in &names {
            let mut reconciler = self.reconciler(Self::record_for(state, name));
            tasks.spawn(async move {
                let outcome = reconciler.destroy().await;
                (reconciler.into_record(), outcome)
            });
        }

        let mut result = ReconciliationResult::default();
        while let Some(joined) = tasks.join_next().await {
            let (record, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    result.errors.push(format!("task: {e}"));
                    continue;
                }
            };
            match outcome {
                Ok(true) => result.deleted += 1,
                Ok(false) => result.unchanged += 1,
                Err(e) => result.errors.push(format!("{}: {e}", record.name)),
            }
            state.set(record);
        }

        result.success = result.errors.is_empty();
        state.add_history(Self::history(HistoryOperation::Destroy, names, &result));
        result
    }

    /// Computes the plan of every studio without executing anything.
    ///
    /// # Errors
    ///
    /// Returns the first refresh or planning error, including
    /// `ImmutableAttributeConflict`.
    pub async fn plan(&self, state: &WorkspaceState) -> Result<Vec<ReconciliationPlan>> {
        let mut plans = Vec::with_capacity(self.config.studios.len());
        for studio in &self.config.studios {
            let mut reconciler = self.reconciler(Self::record_for(state, &studio.key));
            let refreshed = reconciler.refresh().await?;
            let plan = reconciler.reconcile(&DesiredConfiguration::from(studio), refreshed.observed.as_ref())?;
            plans.push(plan);
        }
        Ok(plans)
    }

    /// Checks every studio for drift without changing anything remotely.
    pub async fn check_drift(&self, state: &WorkspaceState) -> DriftReport {
        let mut report = DriftReport {
            total_resources: self.config.studios.len(),
            ..DriftReport::default()
        };

        for studio in &self.config.studios {
            let mut reconciler = self.reconciler(Self::record_for(state, &studio.key));
            let refreshed = match reconciler.refresh().await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    report.errors.push(format!("{}: {e}", studio.key));
                    continue;
                }
            };
            if let Some(drift) = &refreshed.drift {
                report.changes.push(format!("{}: {drift}", studio.key));
            }
            match reconciler.reconcile(&DesiredConfiguration::from(studio), refreshed.observed.as_ref()) {
                Ok(plan) if plan.is_empty() => {}
                Ok(_) => report.drifted_resources.push(studio.key.clone()),
                Err(e) => {
                    report.drifted_resources.push(studio.key.clone());
                    report.errors.push(format!("{}: {e}", studio.key));
                }
            }
        }

        let declared: BTreeSet<&str> = self.config.studio_keys().into_iter().collect();
        report.orphaned = state
            .studio_names()
            .into_iter()
            .filter(|name| !declared.contains(name))
            .map(String::from)
            .collect();

        report.has_drift = !report.drifted_resources.is_empty()
            || !report.changes.is_empty()
            || !report.orphaned.is_empty();
        report
    }

    /// Imports an existing studio under a declared key.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStudio` if `key` is not declared, and any lookup error.
    pub async fn import(
        &self,
        state: &mut WorkspaceState,
        key: &str,
        id: &crate::resource::ResourceId,
    ) -> Result<()> {
        if self.config.studio(key).is_none() {
            return Err(ConfigError::UnknownStudio { name: key.to_string() }.into());
        }

        let mut reconciler = self.reconciler(Self::record_for(state, key));
        let outcome = reconciler.import(id).await;
        let entry = match &outcome {
            Ok(_) => HistoryEntry::new(HistoryOperation::Import, vec![key.to_string()]),
            Err(e) => HistoryEntry::failed(HistoryOperation::Import, vec![key.to_string()], &e.to_string()),
        };
        state.add_history(entry);
        outcome?;

        state.set(reconciler.into_record());
        Ok(())
    }

    fn history(
        operation: HistoryOperation,
        resources: Vec<String>,
        result: &ReconciliationResult,
    ) -> HistoryEntry {
        if result.success {
            HistoryEntry::new(operation, resources)
        } else {
            HistoryEntry::failed(operation, resources, &result.errors.join("; "))
        }
    }
}

impl ReconciliationResult {
    fn record_outcome(&mut self, name: &str, outcome: &ApplyOutcome) {
        if outcome.operations.is_empty() {
            self.unchanged += 1;
        }
        for op in &outcome.operations {
            match op {
                Mutation::Create => self.created += 1,
                Mutation::Update => self.updated += 1,
                Mutation::Delete => self.deleted += 1,
            }
        }
        self.drift
            .extend(outcome.drift.iter().map(|d: &Drift| format!("{name}: {d}")));
    }

    /// Turns a failed run into an error.
    ///
    /// # Errors
    ///
    /// Returns `Aborted` listing every studio error.
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(StudioError::Reconcile(crate::error::ReconcileError::Aborted {
                reason: self.errors.join("; "),
            }))
        }
    }
}

impl DriftReport {
    /// Returns true if nothing drifted.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_drift {
            write!(f, "No drift detected - {} studio(s) converged", self.total_resources)?;
        } else {
            writeln!(f, "Drift detected:")?;
            for resource in &self.drifted_resources {
                writeln!(f, "  - {resource} needs changes")?;
            }
            for change in &self.changes {
                writeln!(f, "  - {change}")?;
            }
            for orphan in &self.orphaned {
                writeln!(f, "  - {orphan} is tracked but no longer declared")?;
            }
        }
        for error in &self.errors {
            write!(f, "\n  ! {error}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.drift.is_empty() {
            writeln!(f, "  Drift:")?;
            for drift in &self.drift {
                writeln!(f, "    - {drift}")?;
            }
        }
        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::remote::InMemoryClient;

    const CONFIG: &str = r#"
project:
  name: analytics
studios:
  - key: alpha
    name: alpha-studio
    auth_mode: IAM
    vpc_id: vpc-1
    subnet_ids: [subnet-1]
    service_role: arn:aws:iam::123456789012:role/service
    workspace_security_group_id: sg-1
    engine_security_group_id: sg-2
    default_s3_location: s3://bucket/alpha
  - key: beta
    name: beta-studio
    auth_mode: IAM
    vpc_id: vpc-1
    subnet_ids: [subnet-1]
    service_role: arn:aws:iam::123456789012:role/service
    workspace_security_group_id: sg-1
    engine_security_group_id: sg-2
    default_s3_location: s3://bucket/beta
"#;

    fn config() -> DeployConfig {
        ConfigParser::new().parse_yaml(CONFIG, None).unwrap()
    }

    fn fleet<'a>(config: &'a DeployConfig, client: &Arc<InMemoryClient>) -> ProjectReconciler<'a, InMemoryClient> {
        ProjectReconciler::new(config, Arc::clone(client))
            .with_wait_policy(WaitPolicy::fast(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_apply_all_then_converged() {
        let config = config();
        let client = Arc::new(InMemoryClient::new());
        let fleet = fleet(&config, &client);
        let mut state = WorkspaceState::new("analytics", "dev");

        let result = fleet.apply(&mut state).await;
        assert!(result.success, "{result}");
        assert_eq!(result.created, 2);
        assert_eq!(state.studio_names(), vec!["alpha", "beta"]);

        let again = fleet.apply(&mut state).await;
        assert_eq!(again.unchanged, 2);
        assert!(fleet.check_drift(&state).await.is_converged());
        assert_eq!(state.history.len(), 2);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let config = config();
        let client = Arc::new(InMemoryClient::new());
        client.inject(crate::remote::Call::Create, crate::remote::Fault::Authentication);
        let fleet = fleet(&config, &client);
        let mut state = WorkspaceState::new("analytics", "dev");

        let result = fleet.apply(&mut state).await;
        assert!(!result.success);
        assert_eq!(result.created, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.into_result().is_err());
    }

    #[tokio::test]
    async fn test_drift_and_orphans_are_reported() {
        let config = config();
        let client = Arc::new(InMemoryClient::new());
        let fleet = fleet(&config, &client);
        let mut state = WorkspaceState::new("analytics", "dev");
        fleet.apply(&mut state).await;

        let alpha = state.get("alpha").and_then(|r| r.id.clone()).unwrap();
        client.set_tag_out_of_band(&alpha, "owner", "someone");
        let mut orphan = ResourceRecord::new("gamma");
        orphan.id = Some(crate::resource::ResourceId::new("es-0000000099"));
        state.set(orphan);

        let report = fleet.check_drift(&state).await;
        assert!(report.has_drift);
        assert_eq!(report.drifted_resources, vec![String::from("alpha")]);
        assert_eq!(report.orphaned, vec![String::from("gamma")]);
        assert!(report.changes[0].contains("tags.owner"));
    }

    #[tokio::test]
    async fn test_destroy_all() {
        let config = config();
        let client = Arc::new(InMemoryClient::new());
        let fleet = fleet(&config, &client);
        let mut state = WorkspaceState::new("analytics", "dev");
        fleet.apply(&mut state).await;

        let result = fleet.destroy(&mut state).await;
        assert!(result.success);
        assert_eq!(result.deleted, 2);
        assert!(state.studios.is_empty());
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_import_unknown_key_is_refused() {
        let config = config();
        let client = Arc::new(InMemoryClient::new());
        let fleet = fleet(&config, &client);
        let mut state = WorkspaceState::new("analytics", "dev");

        let err = fleet
            .import(&mut state, "nope", &crate::resource::ResourceId::new("es-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::Config(ConfigError::UnknownStudio { .. })));
    }
}
