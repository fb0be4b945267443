//! Error types for the object store abstraction.
//!
//! Every store backend maps its failures onto [`StoreError`] so the reconciler
//! can tell benign races (not found, already exists) from real failures.

use std::fmt;
use std::time::Duration;

use rolesync_core::{Kind, ObjectKey};

/// Errors that can occur during object store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("{kind} {key} not found")]
    NotFound {
        /// The kind of the missing object.
        kind: Kind,
        /// The key of the missing object.
        key: ObjectKey,
    },

    /// Attempted to create an object whose key is already taken.
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// The kind of the existing object.
        kind: Kind,
        /// The key of the existing object.
        key: ObjectKey,
    },

    /// The concurrency token on an update did not match the stored object.
    #[error("{kind} {key} was modified concurrently: expected version {expected}, found {actual}")]
    Conflict {
        /// The kind of the contested object.
        kind: Kind,
        /// The key of the contested object.
        key: ObjectKey,
        /// The resource version sent with the update.
        expected: String,
        /// The resource version currently stored.
        actual: String,
    },

    /// The store rejected the object, e.g. a change to an immutable field.
    #[error("Invalid object: {message}")]
    Invalid {
        /// Why the object was rejected.
        message: String,
    },

    /// The caller is not permitted to perform the operation.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of the denied operation.
        message: String,
    },

    /// Failed to reach the store.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// The operation did not complete within its time bound.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The store operation that timed out.
        operation: &'static str,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// An internal store error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: Kind, key: ObjectKey) -> Self {
        Self::NotFound { kind, key }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(kind: Kind, key: ObjectKey) -> Self {
        Self::AlreadyExists { kind, key }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(
        kind: Kind,
        key: ObjectKey,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind,
            key,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `Invalid` error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if this is a concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if repeating the operation later may succeed without
    /// anything else changing.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Conflict | ErrorCategory::Infrastructure
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Invalid { .. } => ErrorCategory::Validation,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::Connection { .. } | Self::Timeout { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of store errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Object not found.
    NotFound,
    /// Conflict (version or existence).
    Conflict,
    /// Object rejected by the store.
    Validation,
    /// Permission denied.
    Authorization,
    /// Connection or timeout.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Authorization => write!(f, "authorization"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
