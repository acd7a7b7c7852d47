//! Polling helpers with bounded exponential backoff.

use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::WaiterConfig;
use crate::error::{ReconcileError, Result};
use crate::resource::{ObservedState, ResourceId};

use super::client::RemoteClient;

/// How long and how often to poll the control plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitPolicy {
    /// Delay before the second poll.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor applied after each poll.
    pub multiplier: f64,
    /// Overall deadline.
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from(&WaiterConfig::default())
    }
}

impl From<&WaiterConfig> for WaitPolicy {
    fn from(config: &WaiterConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl WaitPolicy {
    /// Creates a policy that polls quickly, for tests and local fakes.
    #[must_use]
    pub const fn fast(timeout: Duration) -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
            timeout,
        }
    }

    /// Returns the delay that follows `current`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::from_secs_f64(
            (current.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Polls until the studio is gone.
///
/// # Errors
///
/// Returns `WaitTimeout` if the studio still exists at the deadline. Any
/// error other than not-found is returned as is.
pub async fn wait_for_absence<C>(client: &C, id: &ResourceId, policy: &WaitPolicy) -> Result<()>
where
    C: RemoteClient + ?Sized,
{
    let start = Instant::now();
    let mut delay = policy.initial_delay;

    loop {
        match client.read(id).await {
            Err(e) if e.is_not_found() => {
                debug!("Studio {id} is gone after {:?}", start.elapsed());
                return Ok(());
            }
            Err(e) => return Err(e),
            Ok(observed) => debug!("Studio {id} still {}", observed.status),
        }

        if start.elapsed() >= policy.timeout {
            return Err(ReconcileError::WaitTimeout {
                resource: id.to_string(),
                expected: String::from("deleted"),
                waited_secs: start.elapsed().as_secs(),
            }
            .into());
        }

        tokio::time::sleep(delay).await;
        delay = policy.next_delay(delay);
    }
}

/// Polls until the studio leaves any transient status.
///
/// # Errors
///
/// Returns `WaitTimeout` at the deadline and propagates read errors,
/// including not-found.
pub async fn wait_until_stable<C>(
    client: &C,
    id: &ResourceId,
    policy: &WaitPolicy,
) -> Result<ObservedState>
where
    C: RemoteClient + ?Sized,
{
    let start = Instant::now();
    let mut delay = policy.initial_delay;

    loop {
        let observed = client.read(id).await?;
        if !observed.status.is_transient() {
            return Ok(observed);
        }
        debug!("Studio {id} is {}, waiting", observed.status);

        if start.elapsed() >= policy.timeout {
            return Err(ReconcileError::WaitTimeout {
                resource: id.to_string(),
                expected: String::from("available"),
                waited_secs: start.elapsed().as_secs(),
            }
            .into());
        }

        tokio::time::sleep(delay).await;
        delay = policy.next_delay(delay);
    }
}
