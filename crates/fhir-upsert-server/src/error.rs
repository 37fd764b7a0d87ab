//! Conditional upsert errors and their HTTP rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fhir_upsert_storage::{ErrorCategory, StorageError};
use serde_json::{Value, json};

/// Failures of [`ConditionalUpsertEngine::execute`](crate::ConditionalUpsertEngine::execute).
#[derive(Debug, thiserror::Error)]
pub enum UpsertError {
    /// One resource matched, but the request body names a different id.
    #[error(
        "Resource id '{candidate_id}' does not match the id '{existing_id}' of the {resource_type} found by the conditional criteria"
    )]
    IdentifierConflict {
        resource_type: String,
        existing_id: String,
        candidate_id: String,
    },

    /// More than one resource matched.
    #[error(
        "{match_count} {resource_type} resources matched the conditional criteria; the criteria are not selective enough"
    )]
    AmbiguousMatch {
        resource_type: String,
        match_count: usize,
    },

    /// Nothing matched and creating under a client-assigned id is disabled.
    #[error("{resource_type}/{id} does not exist and update-as-create is not supported")]
    UpdateAsCreateNotSupported { resource_type: String, id: String },

    #[error("Conditional update cancelled")]
    Cancelled,

    /// A gateway failure, with the resource it concerned.
    #[error("{resource_type}/{}: {source}", .id.as_deref().unwrap_or("*"))]
    Storage {
        resource_type: String,
        id: Option<String>,
        #[source]
        source: StorageError,
    },
}

impl UpsertError {
    /// Wraps a gateway error. Gateway cancellation becomes [`UpsertError::Cancelled`].
    #[must_use]
    pub fn storage(resource_type: &str, id: Option<&str>, source: StorageError) -> Self {
        if source.is_cancelled() {
            return Self::Cancelled;
        }
        Self::Storage {
            resource_type: resource_type.to_string(),
            id: id.map(str::to_string),
            source,
        }
    }

    pub fn storage_source(&self) -> Option<&StorageError> {
        match self {
            Self::Storage { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.outcome_parts().0
    }

    fn outcome_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::IdentifierConflict { .. } => (StatusCode::BAD_REQUEST, "invalid"),
            Self::AmbiguousMatch { .. } => (StatusCode::PRECONDITION_FAILED, "multiple-matches"),
            Self::UpdateAsCreateNotSupported { .. } => {
                (StatusCode::METHOD_NOT_ALLOWED, "not-supported")
            }
            Self::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
            Self::Storage { source, .. } => match source {
                StorageError::NotFound { .. } => (StatusCode::NOT_FOUND, "not-found"),
                StorageError::VersionMismatch { .. } => (StatusCode::CONFLICT, "conflict"),
                StorageError::Conflict { .. } => (StatusCode::CONFLICT, "duplicate"),
                StorageError::Unavailable { .. } | StorageError::Cancelled => {
                    (StatusCode::SERVICE_UNAVAILABLE, "transient")
                }
                StorageError::InvalidResource { .. } => (StatusCode::BAD_REQUEST, "invalid"),
                StorageError::Internal { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "exception")
                }
            },
        }
    }
}

/// Errors returned by the dispatcher, rendered as `OperationOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request could not be turned into a conditional update.
    #[error("Bad request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Upsert(#[from] UpsertError),
}

impl ApiError {
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upsert(err) => err.status_code(),
        }
    }

    /// Category of the underlying gateway failure, if any.
    pub fn storage_category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Upsert(err) => err.storage_source().map(StorageError::category),
            Self::InvalidRequest(_) => None,
        }
    }

    fn issue_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid",
            Self::Upsert(err) => err.outcome_parts().1,
        }
    }

    pub fn operation_outcome(&self) -> Value {
        let severity = if self.status_code().is_server_error() {
            "fatal"
        } else {
            "error"
        };
        json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": severity,
                "code": self.issue_code(),
                "diagnostics": self.to_string()
            }]
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.storage_category().map(tracing::field::display);
        if status.is_server_error() {
            tracing::error!(error = %self, category, "conditional update failed");
        } else {
            tracing::debug!(
                error = %self,
                status = status.as_u16(),
                category,
                "conditional update rejected"
            );
        }
        (status, Json(self.operation_outcome())).into_response()
    }
}
