//! Turns inbound conditional update requests into engine calls.

use std::sync::Arc;

use fhir_upsert_core::{Resource, validate_id};
use fhir_upsert_storage::{SearchFilter, StoredRecord};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::conditional::{ConditionalUpsertEngine, UpsertOutcome};
use crate::error::ApiError;

/// Transport-neutral result of a successful conditional update.
#[derive(Debug, Clone)]
pub struct WriteResponse {
    /// 201 for a create, 200 for an update.
    pub status: u16,
    /// Weak entity tag of the written version, e.g. `W/"3"`.
    pub etag: String,
    /// `{type}/{id}/_history/{version}`
    pub location: String,
    pub body: Value,
    pub outcome: UpsertOutcome,
}

impl WriteResponse {
    fn from_outcome(outcome: UpsertOutcome) -> Self {
        let record: &StoredRecord = outcome.record();
        let status = if outcome.is_created() { 201 } else { 200 };
        Self {
            status,
            etag: record.version.to_weak_etag(),
            location: format!(
                "{}/{}/_history/{}",
                record.resource_type, record.id, record.version
            ),
            body: record.resource.clone(),
            outcome,
        }
    }

    pub fn is_created(&self) -> bool {
        self.outcome.is_created()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<ConditionalUpsertEngine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<ConditionalUpsertEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ConditionalUpsertEngine {
        &self.engine
    }

    /// Handles `PUT [type]?[criteria]` with `body` as the candidate resource.
    ///
    /// Result-control parameters in `query` are dropped before the search; at
    /// least one matching parameter must remain.
    pub async fn conditional_update(
        &self,
        resource_type: &str,
        body: Value,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<WriteResponse, ApiError> {
        let candidate = parse_candidate(resource_type, body)?;

        let filter = SearchFilter::parse_query(query).without_result_parameters();
        if filter.is_empty() {
            return Err(ApiError::invalid_request(format!(
                "conditional update of {resource_type} requires search criteria"
            )));
        }

        let outcome = self.engine.execute(candidate, &filter, cancel).await?;
        let response = WriteResponse::from_outcome(outcome);
        tracing::info!(
            resource_type,
            status = response.status,
            location = %response.location,
            "conditional update applied"
        );
        Ok(response)
    }
}

fn parse_candidate(resource_type: &str, body: Value) -> Result<Resource, ApiError> {
    let resource =
        Resource::from_json(body).map_err(|e| ApiError::invalid_request(e.to_string()))?;

    if resource.resource_type() != resource_type {
        return Err(ApiError::invalid_request(format!(
            "resourceType '{}' does not match the request path '{resource_type}'",
            resource.resource_type()
        )));
    }
    if let Some(id) = resource.id() {
        validate_id(id).map_err(|e| ApiError::invalid_request(format!("invalid id: {e}")))?;
    }
    Ok(resource)
}
