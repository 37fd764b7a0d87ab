//! Optimistic-concurrency version tokens.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque version stamp attached to one stored version of a resource.
///
/// Two tokens are equal iff their underlying strings are equal. Tokens carry
/// no ordering; a newer token simply replaces the older one as the valid
/// precondition for the next write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(version_id: impl Into<String>) -> Self {
        Self(version_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders the token as a weak entity tag, e.g. `W/"3"`.
    pub fn to_weak_etag(&self) -> String {
        format!("W/\"{}\"", self.0)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VersionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for VersionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
