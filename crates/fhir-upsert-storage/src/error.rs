//! Storage error types for the gateway layer.
//!
//! This module defines all error types that search and data store backends can
//! report. The conditional upsert engine never recovers from these; it forwards
//! them to its caller with added context.

use std::fmt;

use fhir_upsert_core::{CoreError, VersionToken};

/// Errors that can occur during search or storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The targeted resource does not exist (or was deleted concurrently).
    #[error("Resource not found: {resource_type}/{id}")]
    NotFound {
        /// The type of resource that was not found.
        resource_type: String,
        /// The ID of the resource that was not found.
        id: String,
    },

    /// The stored version no longer matches the expected precondition.
    #[error("Version mismatch: expected {expected}, found {actual}")]
    VersionMismatch {
        /// The version the caller expected.
        expected: VersionToken,
        /// The version currently stored.
        actual: VersionToken,
    },

    /// Attempted to create a resource whose identifier already exists.
    #[error("Resource already exists: {resource_type}/{id}")]
    Conflict {
        /// The type of resource that already exists.
        resource_type: String,
        /// The ID of the resource that already exists.
        id: String,
    },

    /// The backend cannot currently serve requests.
    #[error("Storage unavailable: {message}")]
    Unavailable {
        /// Description of the outage.
        message: String,
    },

    /// The resource data is invalid.
    #[error("Invalid resource: {message}")]
    InvalidResource {
        /// Description of why the resource is invalid.
        message: String,
    },

    /// The operation was cancelled by the caller before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates a new `VersionMismatch` error.
    #[must_use]
    pub fn version_mismatch(expected: impl Into<VersionToken>, actual: impl Into<VersionToken>) -> Self {
        Self::VersionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidResource` error.
    #[must_use]
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
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

    /// Returns `true` if this is a version mismatch error.
    #[must_use]
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }

    /// Returns `true` if this is an already-exists conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if this is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::VersionMismatch { .. } => ErrorCategory::Conflict,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Unavailable { .. } => ErrorCategory::Infrastructure,
            Self::InvalidResource { .. } => ErrorCategory::Validation,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<CoreError> for StorageError {
    fn from(err: CoreError) -> Self {
        Self::invalid_resource(err.to_string())
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Resource not found.
    NotFound,
    /// Conflict (version or existence).
    Conflict,
    /// Validation error.
    Validation,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Cancelled by the caller.
    Cancelled,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("Patient", "123");
        assert_eq!(err.to_string(), "Resource not found: Patient/123");

        let err = StorageError::version_mismatch("1", "2");
        assert_eq!(err.to_string(), "Version mismatch: expected 1, found 2");

        let err = StorageError::conflict("Patient", "456");
        assert_eq!(err.to_string(), "Resource already exists: Patient/456");

        let err = StorageError::unavailable("pool exhausted");
        assert_eq!(err.to_string(), "Storage unavailable: pool exhausted");
    }

    #[test]
    fn test_error_predicates() {
        let err = StorageError::not_found("Patient", "123");
        assert!(err.is_not_found());
        assert!(!err.is_version_mismatch());
        assert!(!err.is_conflict());

        let err = StorageError::version_mismatch("1", "2");
        assert!(!err.is_not_found());
        assert!(err.is_version_mismatch());

        assert!(StorageError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("Patient", "123").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::version_mismatch("1", "2").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::conflict("Patient", "456").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::unavailable("down").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(StorageError::Cancelled.category(), ErrorCategory::Cancelled);
    }

    #[test]
    fn test_core_error_conversion() {
        let err: StorageError = CoreError::invalid_id("a b").into();
        assert!(matches!(err, StorageError::InvalidResource { .. }));
        assert!(err.to_string().contains("a b"));
    }
}
