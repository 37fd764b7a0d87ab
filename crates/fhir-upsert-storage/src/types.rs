//! Gateway types shared by search and storage backends.

use fhir_upsert_core::VersionToken;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Search parameters that control the shape of a result set rather than which
/// resources match. They never narrow a conditional match.
pub const RESULT_PARAMETERS: &[&str] = &[
    "_count",
    "_sort",
    "_summary",
    "_elements",
    "_format",
    "_pretty",
    "_total",
    "_include",
    "_revinclude",
    "_contained",
    "_containedType",
];

/// A resource as persisted by the data store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// The resource ID.
    pub id: String,
    /// The version stamp of this specific version.
    pub version: VersionToken,
    /// The FHIR resource type (e.g., "Patient", "Observation").
    pub resource_type: String,
    /// The full resource content as JSON.
    pub resource: Value,
    /// When this version was written.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// When the resource was originally created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StoredRecord {
    /// Creates a new `StoredRecord`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        version: impl Into<VersionToken>,
        resource_type: impl Into<String>,
        resource: Value,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            version: version.into(),
            resource_type: resource_type.into(),
            resource,
            last_updated: now,
            created_at: now,
        }
    }

    /// Creates the next version of this record with updated content.
    #[must_use]
    pub fn new_version(&self, version: impl Into<VersionToken>, resource: Value) -> Self {
        Self {
            id: self.id.clone(),
            version: version.into(),
            resource_type: self.resource_type.clone(),
            resource,
            last_updated: OffsetDateTime::now_utc(),
            created_at: self.created_at,
        }
    }
}

/// Whether a save created a new logical resource or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveKind {
    Created,
    Updated,
}

/// Result of [`DataStoreGateway::upsert`](crate::DataStoreGateway::upsert).
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub record: StoredRecord,
    pub kind: SaveKind,
}

impl SaveOutcome {
    #[must_use]
    pub fn created(record: StoredRecord) -> Self {
        Self {
            record,
            kind: SaveKind::Created,
        }
    }

    #[must_use]
    pub fn updated(record: StoredRecord) -> Self {
        Self {
            record,
            kind: SaveKind::Updated,
        }
    }
}

/// Ordered search criteria.
///
/// Pairs keep their insertion order when forwarded to a search backend so that
/// query caching and logging stay deterministic. Repeated names are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    params: Vec<(String, String)>,
}

impl SearchFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` query string.
    #[must_use]
    pub fn parse_query(query: &str) -> Self {
        let params = url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self { params }
    }

    /// Adds a search parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.push((name.into(), value.into()));
    }

    /// Returns a copy without result-control parameters such as `_count`.
    #[must_use]
    pub fn without_result_parameters(&self) -> Self {
        let params = self
            .params
            .iter()
            .filter(|(name, _)| !RESULT_PARAMETERS.contains(&name.as_str()))
            .cloned()
            .collect();
        Self { params }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Renders the filter back to a query string, preserving order.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }
}

impl std::fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

/// Result of a search query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matching records. Order is not significant.
    pub entries: Vec<StoredRecord>,
}

impl SearchResult {
    /// Creates a new empty `SearchResult`.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a new `SearchResult` with entries.
    #[must_use]
    pub fn with_entries(entries: Vec<StoredRecord>) -> Self {
        Self { entries }
    }

    /// Returns the number of entries in this result.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query_preserves_order() {
        let filter = SearchFilter::parse_query("?name=Smith&birthdate=1970-01-01&name=John");
        let pairs: Vec<_> = filter.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("name", "Smith"),
                ("birthdate", "1970-01-01"),
                ("name", "John"),
            ]
        );
    }

    #[test]
    fn test_parse_query_decodes_values() {
        let filter = SearchFilter::parse_query("identifier=urn%3Amrn%7C123&family=O+Brien");
        let pairs: Vec<_> = filter.iter().collect();
        assert_eq!(pairs, vec![("identifier", "urn:mrn|123"), ("family", "O Brien")]);
    }

    #[test]
    fn test_parse_empty_query() {
        assert!(SearchFilter::parse_query("").is_empty());
        assert!(SearchFilter::parse_query("?").is_empty());
    }

    #[test]
    fn test_without_result_parameters() {
        let filter = SearchFilter::new()
            .with_param("_count", "10")
            .with_param("name", "Smith")
            .with_param("_sort", "-date");
        let stripped = filter.without_result_parameters();
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped.iter().next(), Some(("name", "Smith")));
    }

    #[test]
    fn test_query_string_round_trips_order() {
        let filter = SearchFilter::new()
            .with_param("b", "2")
            .with_param("a", "x|y");
        assert_eq!(filter.to_query_string(), "b=2&a=x%7Cy");
        assert_eq!(SearchFilter::parse_query(&filter.to_query_string()), filter);
    }

    #[test]
    fn test_stored_record_new_version_keeps_identity() {
        let record = StoredRecord::new("abc", "1", "Patient", json!({"resourceType": "Patient"}));
        let next = record.new_version("2", json!({"resourceType": "Patient", "active": true}));
        assert_eq!(next.id, "abc");
        assert_eq!(next.created_at, record.created_at);
        assert_ne!(next.version, record.version);
    }

    #[test]
    fn test_save_outcome_constructors() {
        let record = StoredRecord::new("abc", "1", "Patient", json!({}));
        assert_eq!(SaveOutcome::created(record.clone()).kind, SaveKind::Created);
        assert_eq!(SaveOutcome::updated(record).kind, SaveKind::Updated);
    }
}
