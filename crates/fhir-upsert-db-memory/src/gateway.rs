//! Gateway trait implementations for InMemoryStorage.

use async_trait::async_trait;
use fhir_upsert_core::{Resource, VersionToken};
use fhir_upsert_storage::{
    DataStoreGateway, SaveOutcome, SearchFilter, SearchGateway, SearchResult, StorageError,
    StoredRecord,
};
use tokio_util::sync::CancellationToken;

use crate::query::QueryFilter;
use crate::storage::InMemoryStorage;

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), StorageError> {
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }
    Ok(())
}

#[async_trait]
impl SearchGateway for InMemoryStorage {
    async fn query(
        &self,
        resource_type: &str,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, StorageError> {
        ensure_not_cancelled(cancel)?;
        let criteria = QueryFilter::compile(filter)?;
        Ok(SearchResult::with_entries(self.find(resource_type, &criteria)?))
    }
}

#[async_trait]
impl DataStoreGateway for InMemoryStorage {
    async fn create(
        &self,
        resource: &Resource,
        cancel: &CancellationToken,
    ) -> Result<StoredRecord, StorageError> {
        ensure_not_cancelled(cancel)?;
        self.insert_new(resource)
    }

    async fn upsert(
        &self,
        resource: &Resource,
        expected_version: Option<&VersionToken>,
        cancel: &CancellationToken,
    ) -> Result<SaveOutcome, StorageError> {
        ensure_not_cancelled(cancel)?;
        self.save(resource, expected_version)
    }

    fn backend_name(&self) -> &'static str {
        "in-memory-dashmap"
    }
}
