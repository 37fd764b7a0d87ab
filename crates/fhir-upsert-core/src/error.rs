use thiserror::Error;

/// Core error types for resource and identifier handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid FHIR ID: {0}")]
    InvalidId(String),

    #[error("Invalid resource data: {message}")]
    InvalidResource { message: String },
}

impl CoreError {
    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Create a new InvalidResource error
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
