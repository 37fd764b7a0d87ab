//! Conditional update engine.
//!
//! A conditional update carries search criteria instead of a resource id. The
//! engine runs the search once, then branches on the number of matches:
//!
//! | matches | candidate id            | action                                   |
//! |---------|-------------------------|------------------------------------------|
//! | 0       | none                    | plain create, store assigns the id       |
//! | 0       | present                 | update-as-create under the client id     |
//! | 1       | none or equal to match  | upsert guarded by the match's version    |
//! | 1       | different from match    | `IdentifierConflict`                     |
//! | > 1     | any                     | `AmbiguousMatch`                         |
//!
//! The window between the search and the write is not locked. A concurrent
//! writer that moves the matched record is caught by the store's version
//! check and surfaces as a storage error.

use std::future::Future;

use fhir_upsert_core::Resource;
use fhir_upsert_storage::{
    DynDataStore, DynSearchGateway, SaveKind, SaveOutcome, SearchFilter, StorageError,
    StoredRecord,
};
use tokio_util::sync::CancellationToken;

use crate::error::UpsertError;

/// Capabilities the engine advertises to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionalOptions {
    /// Allow a client-supplied id to create a resource when nothing matched.
    pub allow_update_as_create: bool,
}

impl Default for ConditionalOptions {
    fn default() -> Self {
        Self {
            allow_update_as_create: true,
        }
    }
}

/// Result of a successful conditional update.
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    Created(StoredRecord),
    Updated(StoredRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &StoredRecord {
        match self {
            Self::Created(record) | Self::Updated(record) => record,
        }
    }

    pub fn into_record(self) -> StoredRecord {
        match self {
            Self::Created(record) | Self::Updated(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

impl From<SaveOutcome> for UpsertOutcome {
    fn from(outcome: SaveOutcome) -> Self {
        match outcome.kind {
            SaveKind::Created => Self::Created(outcome.record),
            SaveKind::Updated => Self::Updated(outcome.record),
        }
    }
}

/// Resolves conditional updates against injected search and store gateways.
///
/// Holds no mutable state; share it behind an `Arc` across request tasks.
pub struct ConditionalUpsertEngine {
    search: DynSearchGateway,
    store: DynDataStore,
    options: ConditionalOptions,
}

impl ConditionalUpsertEngine {
    pub fn new(search: DynSearchGateway, store: DynDataStore, options: ConditionalOptions) -> Self {
        Self {
            search,
            store,
            options,
        }
    }

    pub fn options(&self) -> ConditionalOptions {
        self.options
    }

    /// Backend name of the injected data store, for diagnostics.
    pub fn store_backend(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Applies `candidate` under the criteria in `filter`.
    ///
    /// The search is scoped to the candidate's resource type. At most one
    /// mutating gateway call is made, and none when an error is returned
    /// before the write step.
    #[tracing::instrument(
        name = "conditional_upsert",
        skip_all,
        fields(
            resource_type = %candidate.resource_type(),
            id = candidate.id().unwrap_or_default(),
            criteria = %filter,
            matches = tracing::field::Empty,
        )
    )]
    pub async fn execute(
        &self,
        candidate: Resource,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, UpsertError> {
        if cancel.is_cancelled() {
            return Err(UpsertError::Cancelled);
        }

        let resource_type = candidate.resource_type().to_string();
        let found = until_cancelled(cancel, self.search.query(&resource_type, filter, cancel))
            .await
            .map_err(|e| UpsertError::storage(&resource_type, candidate.id(), e))?;

        tracing::Span::current().record("matches", found.len());

        let mut entries = found.entries;
        match entries.len() {
            0 => self.create_unmatched(candidate, cancel).await,
            1 => {
                let matched = entries.swap_remove(0);
                self.update_matched(candidate, matched, cancel).await
            }
            match_count => {
                tracing::info!(match_count, "conditional criteria matched several resources");
                Err(UpsertError::AmbiguousMatch {
                    resource_type,
                    match_count,
                })
            }
        }
    }

    async fn create_unmatched(
        &self,
        candidate: Resource,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, UpsertError> {
        let Some(id) = candidate.id() else {
            let record = until_cancelled(cancel, self.store.create(&candidate, cancel))
                .await
                .map_err(|e| UpsertError::storage(candidate.resource_type(), None, e))?;
            tracing::debug!(id = %record.id, version = %record.version, "created unmatched resource");
            return Ok(UpsertOutcome::Created(record));
        };

        if !self.options.allow_update_as_create {
            return Err(UpsertError::UpdateAsCreateNotSupported {
                resource_type: candidate.resource_type().to_string(),
                id: id.to_string(),
            });
        }

        let saved = until_cancelled(cancel, self.store.upsert(&candidate, None, cancel))
            .await
            .map_err(|e| UpsertError::storage(candidate.resource_type(), Some(id), e))?;
        tracing::debug!(
            id = %saved.record.id,
            version = %saved.record.version,
            kind = ?saved.kind,
            "update-as-create"
        );
        Ok(saved.into())
    }

    async fn update_matched(
        &self,
        mut candidate: Resource,
        matched: StoredRecord,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, UpsertError> {
        if let Some(id) = candidate.id()
            && id != matched.id
        {
            return Err(UpsertError::IdentifierConflict {
                resource_type: matched.resource_type,
                existing_id: matched.id,
                candidate_id: id.to_string(),
            });
        }

        candidate.set_id(matched.id.as_str());
        let saved = until_cancelled(
            cancel,
            self.store.upsert(&candidate, Some(&matched.version), cancel),
        )
        .await
        .map_err(|e| UpsertError::storage(candidate.resource_type(), Some(matched.id.as_str()), e))?;
        tracing::debug!(
            id = %saved.record.id,
            expected = %matched.version,
            version = %saved.record.version,
            "updated matched resource"
        );
        Ok(saved.into())
    }
}

/// Races a gateway call against the caller's cancellation.
async fn until_cancelled<T, F>(cancel: &CancellationToken, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = call => result,
    }
}
