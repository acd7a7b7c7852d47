//! Error types for the studio lifecycle system.
//!
//! This module provides the error hierarchy for every stage of a studio's
//! lifecycle: configuration, state storage, remote control plane calls,
//! reconciliation and the lifecycle test harness.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the studio lifecycle system.
#[derive(Debug, Error)]
pub enum StudioError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Remote control plane errors.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Lifecycle harness failures.
    #[error("Harness failure: {0}")]
    Harness(#[from] HarnessError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Studio name is not declared in the configuration.
    #[error("Studio '{name}' is not declared in the configuration")]
    UnknownStudio {
        /// The requested studio name.
        name: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written or removed.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Errors returned by a remote control plane.
///
/// Only [`RemoteError::NotFound`] describes a normal state of the world.
/// Every other variant is a failure that the caller must see.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The resource does not exist.
    #[error("Studio not found: {id}")]
    NotFound {
        /// Identifier that was looked up.
        id: String,
    },

    /// The request never produced a usable response.
    #[error("Transport failure during {operation} of {resource}: {message}")]
    Transport {
        /// Attempted operation.
        operation: String,
        /// Resource identifier or name.
        resource: String,
        /// Description of the failure.
        message: String,
    },

    /// Authentication or authorization failed.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Description of the auth failure.
        message: String,
    },

    /// The control plane throttled the request.
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Another writer changed the resource concurrently.
    #[error("Conflicting modification during {operation} of {resource}: {message}")]
    Conflict {
        /// Attempted operation.
        operation: String,
        /// Resource identifier or name.
        resource: String,
        /// Description of the conflict.
        message: String,
    },

    /// API request failed with an unexpected status.
    #[error("API request failed: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Invalid response from the control plane.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A force-new attribute differs from the live resource.
    #[error(
        "Studio '{resource}' cannot change immutable attributes in place: {}",
        .attributes.join(", ")
    )]
    ImmutableAttributeConflict {
        /// Resource name.
        resource: String,
        /// Attributes that differ.
        attributes: Vec<String>,
    },

    /// A mutating operation is already outstanding for the identifier.
    #[error("Operation {operation} already in progress for {resource}")]
    OperationInProgress {
        /// Resource key.
        resource: String,
        /// Operation holding the resource.
        operation: String,
    },

    /// The lifecycle state does not allow the requested operation.
    #[error("Cannot {operation} studio '{resource}' while it is {state}")]
    InvalidTransition {
        /// Resource name.
        resource: String,
        /// Current lifecycle state.
        state: String,
        /// Requested operation.
        operation: String,
    },

    /// A mutation timed out and its outcome is unknown.
    #[error("Outcome of {operation} on '{resource}' is unknown after {timeout_secs}s")]
    UnknownOutcome {
        /// Resource name or identifier.
        resource: String,
        /// Operation that timed out.
        operation: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// Maximum retry attempts exceeded.
    #[error("Maximum retry attempts ({attempts}) exceeded for {resource}")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Resource that failed.
        resource: String,
    },

    /// Polling for a remote condition gave up.
    #[error("Timed out after {waited_secs}s waiting for {resource} to be {expected}")]
    WaitTimeout {
        /// Resource identifier.
        resource: String,
        /// Condition that was expected.
        expected: String,
        /// Seconds spent waiting.
        waited_secs: u64,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Failures reported by the lifecycle test harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A check did not hold after a step.
    #[error("Step {step}: check `{check}` failed: {message}")]
    CheckFailed {
        /// Step index (1-based).
        step: usize,
        /// Check description.
        check: String,
        /// What was observed.
        message: String,
    },

    /// A step left a non-empty plan behind.
    #[error("Step {step}: expected an empty plan after apply, got: {plan}")]
    NonEmptyPlan {
        /// Step index (1-based).
        step: usize,
        /// Rendered plan.
        plan: String,
    },

    /// A step expected a non-empty plan but converged.
    #[error("Step {step}: expected a non-empty plan after apply")]
    EmptyPlan {
        /// Step index (1-based).
        step: usize,
    },

    /// Imported state differs from applied state.
    #[error("Step {step}: import verification failed for {attribute}: applied {applied:?}, imported {imported:?}")]
    ImportMismatch {
        /// Step index (1-based).
        step: usize,
        /// Attribute that differs.
        attribute: String,
        /// Value held after apply.
        applied: Option<String>,
        /// Value found by import.
        imported: Option<String>,
    },

    /// The resource survived destroy.
    #[error("Studio {id} still exists after destroy")]
    StillExists {
        /// Identifier of the surviving resource.
        id: String,
    },

    /// A step needs a resource but none is tracked.
    #[error("Step {step}: no studio is tracked")]
    NothingTracked {
        /// Step index (1-based).
        step: usize,
    },
}

/// Result type alias for studio lifecycle operations.
pub type Result<T> = std::result::Result<T, StudioError>;

impl StudioError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error means the resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::NotFound { .. }))
    }

    /// Returns true if this error reports a concurrent modification.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::Conflict { .. }))
    }

    /// Returns true if a caller may retry the operation.
    ///
    /// The reconciler never retries on its own; this is a hint for callers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote(RemoteError::RateLimited { .. } | RemoteError::Transport { .. })
                | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Remote(RemoteError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            Self::Remote(RemoteError::Transport { .. }) => Some(5),
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl RemoteError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(
        operation: impl Into<String>,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            operation: operation.into(),
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(
        operation: impl Into<String>,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            operation: operation.into(),
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_not_retryable() {
        let err = StudioError::from(RemoteError::not_found("es-123"));
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert!(err.retry_delay_secs().is_none());
    }

    #[test]
    fn test_transport_is_retryable_but_not_not_found() {
        let err = StudioError::from(RemoteError::transport("read", "es-123", "connection reset"));
        assert!(!err.is_not_found());
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(5));
    }

    #[test]
    fn test_immutable_conflict_message_lists_attributes() {
        let err = ReconcileError::ImmutableAttributeConflict {
            resource: String::from("analytics"),
            attributes: vec![String::from("auth_mode"), String::from("user_role")],
        };
        let message = err.to_string();
        assert!(message.contains("analytics"));
        assert!(message.contains("auth_mode, user_role"));
    }
}
