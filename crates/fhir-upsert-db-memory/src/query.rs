//! Exact-match filtering for the in-memory backend.
//!
//! Only `_id`, `identifier=[system|]value` and equality on top-level scalar
//! fields are understood. Anything else is an error rather than an empty
//! match, since zero matches turns a conditional update into a create.

use fhir_upsert_storage::{RESULT_PARAMETERS, SearchFilter, StorageError, StoredRecord};
use serde_json::Value;

/// One compiled search criterion.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// Logical id match (`_id=123`)
    Id(String),
    /// Identifier token (`identifier=system|value` or `identifier=value`)
    Identifier {
        system: Option<String>,
        value: String,
    },
    /// Equality on a top-level field (`gender=female`)
    Exact { field: String, value: String },
}

impl QueryFilter {
    /// Compiles a filter into criteria, skipping result-control parameters.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidResource` for modifiers (`name:exact`),
    /// chained parameters and `_`-prefixed parameters other than `_id`.
    pub fn compile(filter: &SearchFilter) -> Result<Vec<QueryFilter>, StorageError> {
        filter
            .iter()
            .filter(|(name, _)| !RESULT_PARAMETERS.contains(name))
            .map(|(name, value)| Self::from_param(name, value))
            .collect()
    }

    fn from_param(name: &str, value: &str) -> Result<Self, StorageError> {
        if name.contains(':') || name.contains('.') || (name.starts_with('_') && name != "_id") {
            return Err(StorageError::invalid_resource(format!(
                "Unsupported search parameter: {name}"
            )));
        }

        Ok(match name {
            "_id" => QueryFilter::Id(value.to_string()),
            "identifier" => match value.split_once('|') {
                Some((system, value)) => QueryFilter::Identifier {
                    system: (!system.is_empty()).then(|| system.to_string()),
                    value: value.to_string(),
                },
                None => QueryFilter::Identifier {
                    system: None,
                    value: value.to_string(),
                },
            },
            field => QueryFilter::Exact {
                field: field.to_string(),
                value: value.to_string(),
            },
        })
    }

    /// Check if a record matches this criterion.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidResource` when an `Exact` criterion meets
    /// an object, or an array holding objects or arrays, in the record.
    pub fn matches(&self, record: &StoredRecord) -> Result<bool, StorageError> {
        Ok(match self {
            QueryFilter::Id(id) => record.id == *id,
            QueryFilter::Identifier { system, value } => {
                match_identifier(record.resource.get("identifier"), system.as_deref(), value)
            }
            QueryFilter::Exact { field, value } => match record.resource.get(field) {
                None => false,
                Some(Value::Array(items)) => {
                    if items.iter().any(is_complex) {
                        return Err(complex_element(field));
                    }
                    items.iter().any(|item| scalar_equals(item, value))
                }
                Some(field_value) if is_complex(field_value) => {
                    return Err(complex_element(field));
                }
                Some(field_value) => scalar_equals(field_value, value),
            },
        })
    }
}

/// Returns true if every criterion matches.
///
/// Stops at the first criterion that does not match.
pub fn matches_all(criteria: &[QueryFilter], record: &StoredRecord) -> Result<bool, StorageError> {
    for criterion in criteria {
        if !criterion.matches(record)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_complex(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn complex_element(field: &str) -> StorageError {
    StorageError::invalid_resource(format!(
        "Search parameter '{field}' targets a complex element, which exact matching cannot compare"
    ))
}

fn scalar_equals(field_value: &Value, value: &str) -> bool {
    match field_value {
        Value::String(s) => s == value,
        Value::Number(n) => n.to_string() == value,
        Value::Bool(b) => b.to_string() == value,
        _ => false,
    }
}

fn match_identifier(field_value: Option<&Value>, system: Option<&str>, value: &str) -> bool {
    let matches_one = |item: &Value| {
        let Value::Object(obj) = item else {
            return false;
        };
        let system_matches = match system {
            Some(system) => obj.get("system").and_then(|v| v.as_str()) == Some(system),
            None => true,
        };
        system_matches && obj.get("value").and_then(|v| v.as_str()) == Some(value)
    };

    match field_value {
        Some(Value::Array(items)) => items.iter().any(matches_one),
        Some(item @ Value::Object(_)) => matches_one(item),
        _ => false,
    }
}
