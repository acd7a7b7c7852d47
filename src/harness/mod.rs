//! Lifecycle test harness.
//!
//! A [`LifecycleHarness`] drives one studio through a sequence of steps
//! against any [`RemoteClient`]:
//!
//! 1. each [`ApplyStep`] converges on a configuration, runs its checks and
//!    then verifies that a fresh plan is empty (or, if the step says so,
//!    that it is not);
//! 2. each [`ImportStep`] adopts the tracked studio into a new record and
//!    compares the two views attribute by attribute;
//! 3. after the last step, or after the first failure, the studio is
//!    destroyed and every identifier seen along the way must read as
//!    not-found.
//!
//! A step failure takes precedence over a destroy failure in the result.

mod checks;
mod steps;

pub use checks::{Check, CheckFn};
pub use steps::{ApplyStep, ImportStep, TestStep};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, Result};
use crate::planner::DEFAULT_OPERATION_TIMEOUT;
use crate::reconciler::Reconciler;
use crate::remote::{RemoteClient, WaitPolicy, wait_for_absence};
use crate::resource::ResourceId;

/// Runs lifecycle test steps for one studio.
pub struct LifecycleHarness<C: RemoteClient + ?Sized> {
    name: String,
    client: Arc<C>,
    steps: Vec<TestStep>,
    wait: WaitPolicy,
    timeout: Duration,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessReport {
    /// Steps executed.
    pub steps_run: usize,
    /// Every studio identifier tracked during the run.
    pub ids_seen: BTreeSet<ResourceId>,
}

impl<C: RemoteClient + ?Sized> LifecycleHarness<C> {
    /// Creates a harness for the studio with logical name `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, client: Arc<C>) -> Self {
        Self {
            name: name.into(),
            client,
            steps: Vec::new(),
            wait: WaitPolicy::default(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Sets the polling policy.
    #[must_use]
    pub const fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Sets the bound on each remote call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: impl Into<TestStep>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Runs every step, then destroys the studio.
    ///
    /// # Errors
    ///
    /// Returns the first step failure if there was one, otherwise any
    /// failure of the final destroy, including `StillExists`.
    pub async fn run(&self) -> Result<HarnessReport> {
        let mut reconciler = self.reconciler();
        let mut report = HarnessReport::default();

        let steps = self.run_steps(&mut reconciler, &mut report).await;
        if let Err(e) = &steps {
            warn!("{}: step failed, destroying: {e}", self.name);
        }
        let destroy = self.check_destroy(&mut reconciler, &report).await;

        steps?;
        destroy?;
        info!(
            "{}: {} step(s) passed, {} studio(s) destroyed",
            self.name,
            report.steps_run,
            report.ids_seen.len()
        );
        Ok(report)
    }

    fn reconciler(&self) -> Reconciler<C> {
        Reconciler::new(&self.name, Arc::clone(&self.client))
            .with_wait_policy(self.wait)
            .with_timeout(self.timeout)
    }

    async fn run_steps(
        &self,
        reconciler: &mut Reconciler<C>,
        report: &mut HarnessReport,
    ) -> Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            let index = i + 1;
            debug!("{}: step {index}", self.name);
            match step {
                TestStep::Apply(step) => self.apply_step(index, step, reconciler, report).await?,
                TestStep::Import(step) => self.import_step(index, step, reconciler).await?,
            }
            report.steps_run = index;
        }
        Ok(())
    }

    async fn apply_step(
        &self,
        index: usize,
        step: &ApplyStep,
        reconciler: &mut Reconciler<C>,
        report: &mut HarnessReport,
    ) -> Result<()> {
        let outcome = reconciler.apply(&step.desired).await?;
        info!("{}: step {index}: {outcome}", self.name);
        if let Some(id) = &reconciler.record().id {
            report.ids_seen.insert(id.clone());
        }

        for check in &step.checks {
            self.run_check(index, check, reconciler).await?;
        }

        let refreshed = reconciler.refresh().await?;
        let plan = reconciler.reconcile(&step.desired, refreshed.observed.as_ref())?;
        match (plan.is_empty(), step.expect_non_empty_plan) {
            (false, false) => Err(HarnessError::NonEmptyPlan {
                step: index,
                plan: plan.to_string(),
            }
            .into()),
            (true, true) => Err(HarnessError::EmptyPlan { step: index }.into()),
            _ => Ok(()),
        }
    }

    async fn run_check(&self, index: usize, check: &Check, reconciler: &Reconciler<C>) -> Result<()> {
        let failed = |message: String| HarnessError::CheckFailed {
            step: index,
            check: check.to_string(),
            message,
        };

        match check {
            Check::Exists => {
                let id = reconciler
                    .record()
                    .id
                    .clone()
                    .ok_or_else(|| failed(String::from("no studio is tracked")))?;
                match reconciler.find_by_id(&id).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_not_found() => Err(failed(format!("{id} not found")).into()),
                    Err(e) => Err(e),
                }
            }
            Check::Disappears => {
                let id = reconciler
                    .record()
                    .id
                    .clone()
                    .ok_or_else(|| failed(String::from("no studio is tracked")))?;
                match self.client.delete(&id).await {
                    Err(e) if !e.is_not_found() => return Err(e),
                    _ => {}
                }
                wait_for_absence(&*self.client, &id, &self.wait).await?;
                debug!("{}: {id} deleted out of band", self.name);
                Ok(())
            }
            _ => {
                let observed = reconciler
                    .record()
                    .observed
                    .as_ref()
                    .ok_or_else(|| failed(String::from("nothing observed")))?;
                check.verify(observed).map_err(|message| failed(message).into())
            }
        }
    }

    async fn import_step(
        &self,
        index: usize,
        step: &ImportStep,
        reconciler: &mut Reconciler<C>,
    ) -> Result<()> {
        let applied = reconciler
            .refresh()
            .await?
            .observed
            .ok_or(HarnessError::NothingTracked { step: index })?;

        let mut importer = self.reconciler();
        let imported = importer.import(&applied.id).await?;

        let applied = applied.flatten();
        let imported = imported.flatten();
        let keys: BTreeSet<&String> = applied.keys().chain(imported.keys()).collect();
        for key in keys.into_iter().filter(|k| !step.ignores(k)) {
            let (a, b) = (applied.get(key), imported.get(key));
            if a != b {
                return Err(HarnessError::ImportMismatch {
                    step: index,
                    attribute: key.clone(),
                    applied: a.cloned(),
                    imported: b.cloned(),
                }
                .into());
            }
        }
        Ok(())
    }

    async fn check_destroy(&self, reconciler: &mut Reconciler<C>, report: &HarnessReport) -> Result<()> {
        reconciler.destroy().await?;

        for id in &report.ids_seen {
            match reconciler.find_by_id(id).await {
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
                Ok(_) => {
                    return Err(HarnessError::StillExists { id: id.to_string() }.into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StudioError;
    use crate::remote::{Call, Fault, InMemoryClient};
    use crate::resource::{ATTR_NAME, AttributeValue, DesiredConfiguration};

    fn desired() -> DesiredConfiguration {
        DesiredConfiguration::new().with_attribute(ATTR_NAME, AttributeValue::text("analytics"))
    }

    fn harness(client: &Arc<InMemoryClient>) -> LifecycleHarness<InMemoryClient> {
        LifecycleHarness::new("main", Arc::clone(client))
            .with_wait_policy(WaitPolicy::fast(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_failed_check_still_destroys() {
        let client = Arc::new(InMemoryClient::new());
        let err = harness(&client)
            .step(ApplyStep::new(desired()).check(Check::attr(ATTR_NAME, "other")))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StudioError::Harness(HarnessError::CheckFailed { step: 1, .. })
        ));
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_empty_plan() {
        let client = Arc::new(InMemoryClient::new());
        let err = harness(&client)
            .step(ApplyStep::new(desired()).expect_non_empty_plan())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, StudioError::Harness(HarnessError::EmptyPlan { step: 1 })));
    }

    #[tokio::test]
    async fn test_import_without_studio() {
        let client = Arc::new(InMemoryClient::new());
        let err = harness(&client).step(ImportStep::new()).run().await.unwrap_err();
        assert!(matches!(
            err,
            StudioError::Harness(HarnessError::NothingTracked { step: 1 })
        ));
    }

    #[tokio::test]
    async fn test_step_error_wins_over_destroy_error() {
        let client = Arc::new(InMemoryClient::new());
        client.inject(Call::Delete, Fault::Authentication);

        let err = harness(&client)
            .step(ApplyStep::new(desired()).check(Check::tag_count(3)))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, StudioError::Harness(HarnessError::CheckFailed { .. })));
        assert_eq!(client.len(), 1);
    }
}
