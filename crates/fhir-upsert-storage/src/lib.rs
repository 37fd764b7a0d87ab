//! # fhir-upsert-storage
//!
//! Collaborator contracts consumed by the conditional upsert engine.
//!
//! This crate defines the traits and types that search and storage backends
//! must provide. It does not contain any implementations - those live in
//! separate crates such as `fhir-upsert-db-memory`.
//!
//! ## Overview
//!
//! - [`SearchGateway`] executes a filter query for one resource type.
//! - [`DataStoreGateway`] performs a plain create or a version-checked upsert.
//!
//! ## Example
//!
//! ```ignore
//! use fhir_upsert_storage::{SearchFilter, SearchGateway, StorageError, StoredRecord};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn find_by_mrn(
//!     search: &dyn SearchGateway,
//!     mrn: &str,
//! ) -> Result<Vec<StoredRecord>, StorageError> {
//!     let filter = SearchFilter::new().with_param("identifier", format!("urn:mrn|{mrn}"));
//!     let result = search.query("Patient", &filter, &CancellationToken::new()).await?;
//!     Ok(result.entries)
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::{DataStoreGateway, SearchGateway};
pub use types::{RESULT_PARAMETERS, SaveKind, SaveOutcome, SearchFilter, SearchResult, StoredRecord};

/// Type alias for a shared search gateway.
pub type DynSearchGateway = std::sync::Arc<dyn SearchGateway>;

/// Type alias for a shared data store gateway.
pub type DynDataStore = std::sync::Arc<dyn DataStoreGateway>;

