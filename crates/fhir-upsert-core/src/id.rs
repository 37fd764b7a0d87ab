use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Maximum length of a FHIR logical id.
pub const MAX_ID_LENGTH: usize = 64;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-\.]+$").expect("valid id regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("ID must not be empty")]
    Empty,
    #[error("ID is {0} characters long, maximum is 64")]
    TooLong(usize),
    #[error("ID contains characters outside [A-Za-z0-9-.]: {0}")]
    InvalidCharacters(String),
}

impl From<IdError> for crate::CoreError {
    fn from(err: IdError) -> Self {
        crate::CoreError::invalid_id(err.to_string())
    }
}

/// Generates a new server-assigned logical id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates a client-supplied logical id against the FHIR `id` datatype.
pub fn validate_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(IdError::TooLong(id.len()));
    }
    if !ID_PATTERN.is_match(id) {
        return Err(IdError::InvalidCharacters(id.to_string()));
    }
    Ok(())
}
