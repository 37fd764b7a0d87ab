use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fhir_upsert_core::{CoreError, Resource, VersionToken, generate_id, validate_id};
use fhir_upsert_storage::{SaveOutcome, StorageError, StoredRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::query::{QueryFilter, matches_all};

pub type StorageKey = String; // Format: "ResourceType/id"

pub(crate) fn make_storage_key(resource_type: &str, id: &str) -> StorageKey {
    format!("{resource_type}/{id}")
}

/// The operation that produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMethod {
    Create,
    Update,
    Delete,
}

/// A single entry in a resource's history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub record: StoredRecord,
    pub method: HistoryMethod,
}

/// In-memory resource store backed by `dashmap`.
///
/// This storage implementation provides:
/// - Per-record atomic version checks via the map's entry API
/// - Store-wide monotonic version ids (never reused, even across deletes)
/// - History tracking for resource versions
/// - Exact-match search over current versions
#[derive(Debug)]
pub struct InMemoryStorage {
    /// Current version of every live resource
    pub(crate) data: DashMap<StorageKey, StoredRecord>,
    /// History storage: key -> list of historical versions
    pub(crate) history: DashMap<StorageKey, Vec<HistoryEntry>>,
    /// Atomic counter for generating version IDs
    pub(crate) version_counter: AtomicU64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Creates a new, empty in-memory storage.
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            history: DashMap::new(),
            version_counter: AtomicU64::new(1),
        }
    }

    /// Generates the next version ID.
    pub(crate) fn next_version(&self) -> VersionToken {
        VersionToken::new(
            self.version_counter
                .fetch_add(1, Ordering::SeqCst)
                .to_string(),
        )
    }

    /// Must be called while the record's `data` entry guard is held, so that
    /// history order matches version order.
    fn add_history(&self, record: &StoredRecord, method: HistoryMethod) {
        let key = make_storage_key(&record.resource_type, &record.id);
        self.history.entry(key).or_default().push(HistoryEntry {
            record: record.clone(),
            method,
        });
    }

    /// Creates a new resource, assigning an id when none is supplied.
    pub fn insert_new(&self, resource: &Resource) -> Result<StoredRecord, StorageError> {
        let resource_type = resource.resource_type();
        let id = match resource.id() {
            Some(id) => {
                validate_id(id).map_err(CoreError::from)?;
                id.to_string()
            }
            None => generate_id(),
        };

        let record = match self.data.entry(make_storage_key(resource_type, &id)) {
            Entry::Occupied(_) => return Err(StorageError::conflict(resource_type, &id)),
            Entry::Vacant(vacant) => {
                let version = self.next_version();
                let now = OffsetDateTime::now_utc();
                let record = StoredRecord {
                    resource: render_resource(resource, &id, &version, now),
                    id,
                    version,
                    resource_type: resource_type.to_string(),
                    last_updated: now,
                    created_at: now,
                };
                self.add_history(&record, HistoryMethod::Create);
                vacant.insert(record.clone());
                record
            }
        };

        tracing::debug!(
            resource_type = %record.resource_type,
            id = %record.id,
            version = %record.version,
            "resource created"
        );
        Ok(record)
    }

    /// Creates or replaces a resource, optionally guarded by an expected version.
    pub fn save(
        &self,
        resource: &Resource,
        expected_version: Option<&VersionToken>,
    ) -> Result<SaveOutcome, StorageError> {
        let resource_type = resource.resource_type();
        let id = resource
            .id()
            .ok_or_else(|| StorageError::invalid_resource("Missing id field for update"))?;
        validate_id(id).map_err(CoreError::from)?;

        let outcome = match self.data.entry(make_storage_key(resource_type, id)) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if let Some(expected) = expected_version
                    && current.version != *expected
                {
                    return Err(StorageError::version_mismatch(
                        expected.clone(),
                        current.version.clone(),
                    ));
                }
                let version = self.next_version();
                let content =
                    render_resource(resource, id, &version, OffsetDateTime::now_utc());
                let next = current.new_version(version, content);
                self.add_history(&next, HistoryMethod::Update);
                occupied.insert(next.clone());
                SaveOutcome::updated(next)
            }
            Entry::Vacant(vacant) => {
                if expected_version.is_some() {
                    return Err(StorageError::not_found(resource_type, id));
                }
                let version = self.next_version();
                let now = OffsetDateTime::now_utc();
                let record = StoredRecord {
                    id: id.to_string(),
                    resource: render_resource(resource, id, &version, now),
                    version,
                    resource_type: resource_type.to_string(),
                    last_updated: now,
                    created_at: now,
                };
                self.add_history(&record, HistoryMethod::Create);
                vacant.insert(record.clone());
                SaveOutcome::created(record)
            }
        };

        tracing::debug!(
            resource_type,
            id,
            version = %outcome.record.version,
            kind = ?outcome.kind,
            "resource saved"
        );
        Ok(outcome)
    }

    /// Reads the current version of a resource.
    pub fn read(&self, resource_type: &str, id: &str) -> Option<StoredRecord> {
        self.data
            .get(&make_storage_key(resource_type, id))
            .map(|r| r.value().clone())
    }

    /// Deletes a resource. Its history is kept.
    pub fn delete(&self, resource_type: &str, id: &str) -> Result<(), StorageError> {
        match self.data.entry(make_storage_key(resource_type, id)) {
            Entry::Occupied(occupied) => {
                let current = occupied.get();
                let tombstone = current.new_version(self.next_version(), current.resource.clone());
                self.add_history(&tombstone, HistoryMethod::Delete);
                occupied.remove();
                Ok(())
            }
            Entry::Vacant(_) => Err(StorageError::not_found(resource_type, id)),
        }
    }

    /// Returns all history entries for a resource, oldest first.
    pub fn history(&self, resource_type: &str, id: &str) -> Vec<HistoryEntry> {
        self.history
            .get(&make_storage_key(resource_type, id))
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    /// Returns every live record of `resource_type` that satisfies all criteria.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidResource` when a criterion targets a
    /// complex element of a candidate record.
    pub fn find(
        &self,
        resource_type: &str,
        criteria: &[QueryFilter],
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let mut found = Vec::new();
        for entry in self.data.iter() {
            let record = entry.value();
            if record.resource_type == resource_type && matches_all(criteria, record)? {
                found.push(record.clone());
            }
        }
        Ok(found)
    }

    /// Number of live resources.
    pub fn count(&self) -> usize {
        self.data.len()
    }
}

/// Renders stored content with `id` and `meta` set.
fn render_resource(
    resource: &Resource,
    id: &str,
    version: &VersionToken,
    now: OffsetDateTime,
) -> Value {
    let mut content = resource.to_json();
    if let Some(obj) = content.as_object_mut() {
        obj.insert("id".to_string(), Value::String(id.to_string()));
        obj.insert(
            "meta".to_string(),
            serde_json::json!({
                "versionId": version.as_str(),
                "lastUpdated": now.format(&time::format_description::well_known::Rfc3339).unwrap_or_default()
            }),
        );
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir_upsert_storage::SaveKind;
    use serde_json::json;

    fn patient(id: Option<&str>, family: &str) -> Resource {
        let resource = Resource::new("Patient").with_field("name", json!([{ "family": family }]));
        match id {
            Some(id) => resource.with_id(id),
            None => resource,
        }
    }

    #[test]
    fn test_insert_assigns_id_and_meta() {
        let storage = InMemoryStorage::new();
        let created = storage.insert_new(&patient(None, "Smith")).unwrap();

        assert!(!created.id.is_empty());
        assert_eq!(created.resource["id"], created.id.as_str());
        assert_eq!(created.resource["meta"]["versionId"], created.version.as_str());
        assert_eq!(storage.count(), 1);
    }

    #[test]
    fn test_insert_conflicts_on_existing_id() {
        let storage = InMemoryStorage::new();
        storage.insert_new(&patient(Some("fixed-id"), "Smith")).unwrap();

        let err = storage
            .insert_new(&patient(Some("fixed-id"), "Jones"))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_insert_rejects_invalid_id() {
        let storage = InMemoryStorage::new();
        let err = storage
            .insert_new(&patient(Some("not valid"), "Smith"))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidResource { .. }));
    }

    #[test]
    fn test_save_without_expected_creates_then_updates() {
        let storage = InMemoryStorage::new();

        let first = storage.save(&patient(Some("42"), "Smith"), None).unwrap();
        assert_eq!(first.kind, SaveKind::Created);
        assert_eq!(first.record.id, "42");

        let second = storage.save(&patient(Some("42"), "Jones"), None).unwrap();
        assert_eq!(second.kind, SaveKind::Updated);
        assert_ne!(second.record.version, first.record.version);
        assert_eq!(second.record.created_at, first.record.created_at);
    }

    #[test]
    fn test_save_with_expected_version() {
        let storage = InMemoryStorage::new();
        let created = storage.insert_new(&patient(Some("abc"), "Smith")).unwrap();

        let updated = storage
            .save(&patient(Some("abc"), "Jones"), Some(&created.version))
            .unwrap();
        assert_eq!(updated.kind, SaveKind::Updated);

        // The old token is no longer a valid precondition
        let err = storage
            .save(&patient(Some("abc"), "Brown"), Some(&created.version))
            .unwrap_err();
        match err {
            StorageError::VersionMismatch { expected, actual } => {
                assert_eq!(expected, created.version);
                assert_eq!(actual, updated.record.version);
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_save_with_expected_version_on_missing_record() {
        let storage = InMemoryStorage::new();
        let err = storage
            .save(&patient(Some("gone"), "Smith"), Some(&VersionToken::new("1")))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(storage.count(), 0);
    }

    #[test]
    fn test_save_requires_id() {
        let storage = InMemoryStorage::new();
        let err = storage.save(&patient(None, "Smith"), None).unwrap_err();
        assert!(matches!(err, StorageError::InvalidResource { .. }));
    }

    #[test]
    fn test_delete_keeps_history_and_versions_never_repeat() {
        let storage = InMemoryStorage::new();
        let created = storage.insert_new(&patient(Some("abc"), "Smith")).unwrap();
        storage.save(&patient(Some("abc"), "Jones"), None).unwrap();
        storage.delete("Patient", "abc").unwrap();

        assert!(storage.read("Patient", "abc").is_none());
        assert!(storage.delete("Patient", "abc").unwrap_err().is_not_found());

        let recreated = storage.save(&patient(Some("abc"), "Brown"), None).unwrap();
        assert_eq!(recreated.kind, SaveKind::Created);

        let history = storage.history("Patient", "abc");
        let methods: Vec<_> = history.iter().map(|h| h.method).collect();
        assert_eq!(
            methods,
            vec![
                HistoryMethod::Create,
                HistoryMethod::Update,
                HistoryMethod::Delete,
                HistoryMethod::Create
            ]
        );

        let mut versions: Vec<_> = history.iter().map(|h| h.record.version.clone()).collect();
        versions.dedup();
        assert_eq!(versions.len(), 4);
        assert_ne!(recreated.record.version, created.version);
    }

    #[test]
    fn test_find_is_scoped_to_resource_type() {
        let storage = InMemoryStorage::new();
        storage
            .insert_new(&Resource::new("Patient").with_field("status", json!("active")))
            .unwrap();
        storage
            .insert_new(&Resource::new("Observation").with_field("status", json!("active")))
            .unwrap();

        let criteria = vec![QueryFilter::Exact {
            field: "status".into(),
            value: "active".into(),
        }];
        let found = storage.find("Patient", &criteria).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_type, "Patient");
    }

    fn numeric_versions(history: &[HistoryEntry]) -> Vec<u64> {
        history
            .iter()
            .map(|h| h.record.version.as_str().parse().unwrap())
            .collect()
    }

    #[test]
    fn test_concurrent_saves_keep_history_in_version_order() {
        for _ in 0..20 {
            let storage = InMemoryStorage::new();
            std::thread::scope(|scope| {
                for writer in 0..8 {
                    let storage = &storage;
                    scope.spawn(move || {
                        for _ in 0..50 {
                            let family = format!("writer-{writer}");
                            storage.save(&patient(Some("shared"), &family), None).unwrap();
                        }
                    });
                }
            });

            let versions = numeric_versions(&storage.history("Patient", "shared"));
            assert_eq!(versions.len(), 400);
            assert!(versions.windows(2).all(|w| w[0] < w[1]), "{versions:?}");
            assert_eq!(
                storage.read("Patient", "shared").unwrap().version.as_str(),
                versions[399].to_string()
            );
        }
    }

    #[test]
    fn test_delete_and_recreate_race_keeps_history_ordered() {
        for _ in 0..20 {
            let storage = InMemoryStorage::new();
            storage.insert_new(&patient(Some("abc"), "Smith")).unwrap();
            std::thread::scope(|scope| {
                let storage = &storage;
                scope.spawn(move || {
                    for _ in 0..50 {
                        let _ = storage.delete("Patient", "abc");
                    }
                });
                scope.spawn(move || {
                    for _ in 0..50 {
                        storage.save(&patient(Some("abc"), "Jones"), None).unwrap();
                    }
                });
            });

            let history = storage.history("Patient", "abc");
            let versions = numeric_versions(&history);
            assert!(versions.windows(2).all(|w| w[0] < w[1]), "{versions:?}");
            // A delete is always followed by a create, never by another delete.
            for pair in history.windows(2) {
                if pair[0].method == HistoryMethod::Delete {
                    assert_eq!(pair[1].method, HistoryMethod::Create);
                }
            }
        }
    }
}
