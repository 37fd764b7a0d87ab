//! In-memory gateway backend for the conditional upsert server.
//!
//! This crate provides [`InMemoryStorage`], which implements both
//! [`SearchGateway`] and [`DataStoreGateway`] from `fhir-upsert-storage` on top
//! of a sharded `dashmap::DashMap`. Version checks and writes for one record
//! happen under that record's entry lock, so a stale precondition is always
//! rejected rather than overwritten.
//!
//! # Example
//!
//! ```ignore
//! use fhir_upsert_core::Resource;
//! use fhir_upsert_db_memory::InMemoryStorage;
//! use fhir_upsert_storage::DataStoreGateway;
//! use tokio_util::sync::CancellationToken;
//!
//! let storage = InMemoryStorage::new();
//! let patient = Resource::new("Patient").with_field("active", serde_json::json!(true));
//! let created = storage.create(&patient, &CancellationToken::new()).await?;
//! ```

mod gateway;
pub mod query;
pub mod storage;

pub use fhir_upsert_storage::{DataStoreGateway, SearchGateway, StorageError, StoredRecord};
pub use query::QueryFilter;
pub use storage::{HistoryEntry, HistoryMethod, InMemoryStorage, StorageKey};

use fhir_upsert_storage::{DynDataStore, DynSearchGateway};

/// Creates one in-memory store and returns it as both gateways.
pub fn create_gateways() -> (DynSearchGateway, DynDataStore) {
    let storage = std::sync::Arc::new(InMemoryStorage::new());
    (storage.clone(), storage)
}
