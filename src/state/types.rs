//! State types for tracking managed studios.
//!
//! These types hold what the reconciler remembers between runs: the remote
//! identifier of each studio, its lifecycle state, the last observed
//! snapshot and a short history of operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::resource::{LifecycleState, Mutation, ObservedState, ResourceId};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept in the state file.
const MAX_HISTORY: usize = 100;

/// The complete workspace state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceState {
    /// State format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Records of individual studios, keyed by logical name.
    pub studios: HashMap<String, ResourceRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Operation history (recent entries).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Everything the reconciler retains about one studio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Logical name (the studio key in the deployment file).
    pub name: String,
    /// Remote identifier, once assigned by create or import.
    #[serde(default)]
    pub id: Option<ResourceId>,
    /// Remote display name used when the identifier is unknown.
    #[serde(default)]
    pub remote_name: Option<String>,
    /// Lifecycle state. A transient value means a mutation's outcome is
    /// unknown and must be resolved by a lookup.
    #[serde(default)]
    pub lifecycle: LifecycleState,
    /// Last observed snapshot.
    #[serde(default)]
    pub observed: Option<ObservedState>,
    /// Hash of the configuration last applied.
    #[serde(default)]
    pub config_hash: Option<String>,
    /// When the studio was first created or imported.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: HistoryOperation,
    /// Studios affected.
    pub resources: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOperation {
    /// Apply of the deployment file.
    Apply,
    /// Import of an existing studio.
    Import,
    /// Destruction.
    Destroy,
}

impl WorkspaceState {
    /// Creates a new empty workspace state.
    #[must_use]
    pub fn new(project: &str, environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            project: project.to_string(),
            environment: environment.to_string(),
            studios: HashMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a studio record by logical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceRecord> {
        self.studios.get(name)
    }

    /// Adds or replaces a studio record.
    ///
    /// Records that no longer track anything are dropped.
    pub fn set(&mut self, record: ResourceRecord) {
        if record.is_untracked() {
            self.studios.remove(&record.name);
        } else {
            self.studios.insert(record.name.clone(), record);
        }
        self.last_updated = Utc::now();
    }

    /// Removes a studio record.
    pub fn remove(&mut self, name: &str) -> Option<ResourceRecord> {
        let result = self.studios.remove(name);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Adds a history entry.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns all studio names, sorted.
    #[must_use]
    pub fn studio_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.studios.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns records whose last mutation has an unknown outcome.
    #[must_use]
    pub fn pending(&self) -> Vec<&ResourceRecord> {
        self.studios
            .values()
            .filter(|r| r.lifecycle.is_transient())
            .collect()
    }
}

impl ResourceRecord {
    /// Creates an empty record for a studio that does not exist yet.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: None,
            remote_name: None,
            lifecycle: LifecycleState::Absent,
            observed: None,
            config_hash: None,
            created_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Returns the mutation whose outcome is unknown, if any.
    #[must_use]
    pub const fn pending(&self) -> Option<Mutation> {
        self.lifecycle.pending_mutation()
    }

    /// Returns true if the studio exists as far as the record knows.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.lifecycle == LifecycleState::Present
            && self.observed.as_ref().is_some_and(|o| o.exists)
    }

    /// Returns true if the record tracks nothing at all.
    #[must_use]
    pub fn is_untracked(&self) -> bool {
        self.id.is_none() && self.lifecycle == LifecycleState::Absent
    }

    /// Adopts an observed studio as present.
    pub fn track(&mut self, observed: ObservedState) {
        let now = Utc::now();
        if self.id.as_ref() != Some(&observed.id) {
            self.created_at = Some(now);
        }
        self.id = Some(observed.id.clone());
        self.lifecycle = LifecycleState::Present;
        if let Some(name) = observed
            .attribute(crate::resource::ATTR_NAME)
            .and_then(crate::resource::AttributeValue::as_text)
        {
            self.remote_name = Some(name.to_string());
        }
        self.observed = Some(observed);
        self.updated_at = now;
    }

    /// Forgets the remote studio after it is gone.
    pub fn clear(&mut self) {
        self.id = None;
        self.lifecycle = LifecycleState::Absent;
        self.observed = None;
        self.config_hash = None;
        self.created_at = None;
        self.updated_at = Utc::now();
    }

    /// Moves the lifecycle to `state`.
    pub fn set_lifecycle(&mut self, state: LifecycleState) {
        self.lifecycle = state;
        self.updated_at = Utc::now();
    }
}

impl HistoryEntry {
    /// Creates a new history entry.
    #[must_use]
    pub fn new(operation: HistoryOperation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: HistoryOperation, resources: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for HistoryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Import => "import",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}
