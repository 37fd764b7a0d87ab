//! Gateway traits consumed by the conditional upsert engine.
//!
//! Both traits take the caller's [`CancellationToken`]. Implementations should
//! return [`StorageError::Cancelled`] promptly once it fires; callers may also
//! drop the returned future at any suspension point.

use async_trait::async_trait;
use fhir_upsert_core::{Resource, VersionToken};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::types::{SaveOutcome, SearchFilter, SearchResult, StoredRecord};

/// Executes filter queries against stored resources.
///
/// # Example
///
/// ```ignore
/// use fhir_upsert_storage::{SearchFilter, SearchGateway};
///
/// let filter = SearchFilter::parse_query("identifier=urn:mrn|123");
/// let matches = search.query("Patient", &filter, &cancel).await?;
/// ```
#[async_trait]
pub trait SearchGateway: Send + Sync {
    /// Returns every stored record of `resource_type` matching `filter`.
    ///
    /// Zero matches is an empty result, not an error. The filter is forwarded
    /// in its original order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the search backend cannot be
    /// reached, or any backend-specific error.
    async fn query(
        &self,
        resource_type: &str,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, StorageError>;
}

/// Persists resources under optimistic concurrency control.
#[async_trait]
pub trait DataStoreGateway: Send + Sync {
    /// Creates a new resource.
    ///
    /// If the resource carries no id, the backend assigns one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the supplied id already exists.
    async fn create(
        &self,
        resource: &Resource,
        cancel: &CancellationToken,
    ) -> Result<StoredRecord, StorageError>;

    /// Creates or replaces the resource identified by `resource`'s type and id.
    ///
    /// Without `expected_version` the write is unconditional: an existing record
    /// is replaced, a missing one is created under the supplied id
    /// (update-as-create). With `expected_version` the current record must
    /// exist and carry exactly that version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidResource` if the resource has no id.
    /// Returns `StorageError::NotFound` if `expected_version` is given and the
    /// record no longer exists.
    /// Returns `StorageError::VersionMismatch` if `expected_version` is given
    /// and differs from the stored version.
    async fn upsert(
        &self,
        resource: &Resource,
        expected_version: Option<&VersionToken>,
        cancel: &CancellationToken,
    ) -> Result<SaveOutcome, StorageError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
