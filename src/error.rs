//! Error types for the autoscaling controller
//!
//! Errors carry enough context (resource kind, object name, operation) to be
//! actionable from a single log line. The controller's error policy uses
//! [`Error::is_retryable`] to decide between requeueing and waiting for a spec
//! change.

use thiserror::Error;

/// Main error type for autoscaling reconciliation
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid autoscaling trait on a component
    #[error("validation error for {component}: {message}")]
    Validation {
        /// Component whose autoscaling trait is invalid
        component: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Write lost an optimistic-concurrency race
    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        /// Resource kind being written
        kind: String,
        /// Namespaced name of the object
        name: String,
        /// Description of the conflict
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "store")
        context: String,
    },
}

impl Error {
    /// Create a validation error for a specific component
    pub fn validation_for(component: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            component: component.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error for a specific resource kind
    pub fn serialization_for(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a conflict error for a write that observed a stale version
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True when a write failed because the object changed since it was read.
    ///
    /// Covers both the explicit [`Error::Conflict`] variant and HTTP 409 from
    /// the API server (stale `resourceVersion` on update, AlreadyExists on create).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 409,
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec or data fix. Everything
    /// else (API availability, lost races, internal hiccups) may clear up on the
    /// next pass.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => ae.code == 409 || ae.code == 429 || ae.code >= 500,
                _ => true,
            },
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Conflict { .. } => true,
            Error::Internal { .. } => true,
        }
    }
}
