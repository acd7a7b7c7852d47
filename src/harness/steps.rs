//! Harness step definitions.

use crate::resource::DesiredConfiguration;

use super::checks::Check;

/// Applies a configuration, then runs checks against the result.
#[derive(Debug, Clone)]
pub struct ApplyStep {
    /// Configuration to converge on.
    pub desired: DesiredConfiguration,
    /// Checks run in order after the apply.
    pub checks: Vec<Check>,
    /// The follow-up plan is expected to contain operations.
    pub expect_non_empty_plan: bool,
}

impl ApplyStep {
    /// Creates an apply step without checks.
    #[must_use]
    pub const fn new(desired: DesiredConfiguration) -> Self {
        Self {
            desired,
            checks: Vec::new(),
            expect_non_empty_plan: false,
        }
    }

    /// Adds a check.
    #[must_use]
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Adds several checks.
    #[must_use]
    pub fn checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.checks.extend(checks);
        self
    }

    /// Expects the plan computed after the checks to be non-empty, as after
    /// an out-of-band delete.
    #[must_use]
    pub const fn expect_non_empty_plan(mut self) -> Self {
        self.expect_non_empty_plan = true;
        self
    }
}

/// Imports the tracked studio into a fresh record and compares the result
/// with what the previous step left behind.
#[derive(Debug, Clone, Default)]
pub struct ImportStep {
    /// Flat keys excluded from the comparison. A key also excludes its
    /// nested keys: `tags` ignores `tags.%` and `tags.<key>`.
    pub ignore: Vec<String>,
}

impl ImportStep {
    /// Creates an import step comparing every key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes a key from the comparison.
    #[must_use]
    pub fn ignore(mut self, key: impl Into<String>) -> Self {
        self.ignore.push(key.into());
        self
    }

    pub(crate) fn ignores(&self, key: &str) -> bool {
        self.ignore.iter().any(|ignored| {
            key == ignored
                || key
                    .strip_prefix(ignored.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

/// One step of a lifecycle test.
#[derive(Debug, Clone)]
pub enum TestStep {
    /// Apply a configuration.
    Apply(ApplyStep),
    /// Verify import against the applied state.
    Import(ImportStep),
}

impl From<ApplyStep> for TestStep {
    fn from(step: ApplyStep) -> Self {
        Self::Apply(step)
    }
}

impl From<ImportStep> for TestStep {
    fn from(step: ImportStep) -> Self {
        Self::Import(step)
    }
}

impl From<DesiredConfiguration> for TestStep {
    fn from(desired: DesiredConfiguration) -> Self {
        Self::Apply(ApplyStep::new(desired))
    }
}
