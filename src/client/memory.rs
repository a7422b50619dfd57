use super::{ResourceStore, UpdateMode, matches_query, validate_collection_name};
use crate::core::{DashboardError, Record, RecordKey, Result, records_from_value};
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-process flat collection store with json-server semantics.
///
/// Besides backing the mock server it records how often each collection was
/// listed and can be told to fail a collection, which is what the join tests
/// rely on.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, Vec<Record>>>,
    fetch_counts: RwLock<HashMap<String, usize>>,
    failing: RwLock<HashSet<String>>,
    requests: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a `db.json` document: an object whose values are arrays of records.
    pub fn from_json(document: JsonValue) -> Result<Self> {
        let JsonValue::Object(map) = document else {
            return Err(DashboardError::InvalidInput(
                "store document must be an object of collections".to_string(),
            ));
        };

        let store = Self::new();
        for (name, value) in map {
            validate_collection_name(&name)?;
            let records = records_from_value(value).map_err(|e| {
                DashboardError::InvalidInput(format!("collection '{name}': {e}"))
            })?;
            store.collections.write()?.insert(name, records);
        }
        Ok(store)
    }

    /// Builder used by fixtures.
    pub fn with_collection(self, name: &str, records: Vec<Record>) -> Self {
        if let Ok(mut collections) = self.collections.write() {
            collections.insert(name.to_string(), records);
        }
        self
    }

    pub fn insert_collection(&self, name: &str, records: Vec<Record>) -> Result<()> {
        validate_collection_name(name)?;
        self.collections.write()?.insert(name.to_string(), records);
        Ok(())
    }

    /// The whole store as a `db.json` document.
    pub fn snapshot(&self) -> Result<JsonValue> {
        let collections = self.collections.read()?;
        let mut map = JsonMap::new();
        for (name, records) in collections.iter() {
            map.insert(
                name.clone(),
                JsonValue::Array(records.iter().cloned().map(Record::into_value).collect()),
            );
        }
        Ok(JsonValue::Object(map))
    }

    pub fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.collections.read()?.keys().cloned().collect())
    }

    /// How many times `name` was listed (plain or filtered).
    pub fn fetch_count(&self, name: &str) -> usize {
        self.fetch_counts
            .read()
            .map(|counts| counts.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Every call made through the store, reads and writes.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) -> Result<()> {
        self.fetch_counts.write()?.clear();
        self.requests.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Every subsequent call touching `name` fails with a network error.
    pub fn fail_collection(&self, name: &str) -> Result<()> {
        self.failing.write()?.insert(name.to_string());
        Ok(())
    }

    pub fn heal_collection(&self, name: &str) -> Result<()> {
        self.failing.write()?.remove(name);
        Ok(())
    }

    fn begin(&self, method: &str, name: &str) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.read()?.contains(name) {
            return Err(DashboardError::http_status(format!("{method} /{name}"), 503));
        }
        Ok(())
    }

    /// Filtered listing.
    pub fn list(&self, name: &str, filters: &[(String, String)]) -> Result<Vec<Record>> {
        self.begin("GET", name)?;
        *self.fetch_counts.write()?.entry(name.to_string()).or_insert(0) += 1;

        let collections = self.collections.read()?;
        let records = collections
            .get(name)
            .ok_or_else(|| DashboardError::CollectionNotFound(name.to_string()))?;
        Ok(records
            .iter()
            .filter(|record| matches_query(record, filters))
            .cloned()
            .collect())
    }

    pub fn get(&self, name: &str, id: &RecordKey) -> Result<Record> {
        self.begin("GET", name)?;
        let collections = self.collections.read()?;
        let records = collections
            .get(name)
            .ok_or_else(|| DashboardError::CollectionNotFound(name.to_string()))?;
        records
            .iter()
            .find(|record| record.id().as_ref() == Some(id))
            .cloned()
            .ok_or_else(|| DashboardError::not_found(name, id))
    }

    /// Inserts a record, assigning `max(numeric id) + 1` when it has none.
    ///
    /// Unknown collections are created on first insert.
    pub fn insert(&self, name: &str, mut payload: Record) -> Result<Record> {
        validate_collection_name(name)?;
        self.begin("POST", name)?;
        let mut collections = self.collections.write()?;
        let records = collections.entry(name.to_string()).or_default();

        match payload.id() {
            Some(id) => {
                if records.iter().any(|r| r.id().as_ref() == Some(&id)) {
                    return Err(DashboardError::InvalidInput(format!(
                        "duplicate id '{id}' in '{name}'"
                    )));
                }
            }
            None => {
                payload.insert("id", JsonValue::String(next_id(records)));
            }
        }

        records.push(payload.clone());
        Ok(payload)
    }

    pub fn replace(&self, name: &str, id: &RecordKey, payload: Record, mode: UpdateMode) -> Result<Record> {
        self.begin(mode.http_method(), name)?;
        let mut collections = self.collections.write()?;
        let records = collections
            .get_mut(name)
            .ok_or_else(|| DashboardError::CollectionNotFound(name.to_string()))?;
        let existing = records
            .iter_mut()
            .find(|record| record.id().as_ref() == Some(id))
            .ok_or_else(|| DashboardError::not_found(name, id))?;

        let stored_id = existing.get("id").cloned().unwrap_or_else(|| id.to_value());
        match mode {
            UpdateMode::Partial => existing.merge(payload),
            UpdateMode::Full => *existing = payload,
        }
        existing.insert("id", stored_id);
        Ok(existing.clone())
    }

    /// Returns whether a record was actually removed.
    pub fn delete(&self, name: &str, id: &RecordKey) -> Result<bool> {
        self.begin("DELETE", name)?;
        let mut collections = self.collections.write()?;
        let Some(records) = collections.get_mut(name) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|record| record.id().as_ref() != Some(id));
        Ok(records.len() != before)
    }
}

/// Legacy id generation: highest numeric id plus one, as a string.
fn next_id(records: &[Record]) -> String {
    let max = records
        .iter()
        .filter_map(|record| record.id())
        .filter_map(|id| id.as_str().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    (max + 1).to_string()
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>> {
        self.list(name, &[])
    }

    async fn fetch_where(&self, name: &str, filters: &[(String, String)]) -> Result<Vec<Record>> {
        self.list(name, filters)
    }

    async fn fetch_one(&self, name: &str, id: &RecordKey) -> Result<Record> {
        self.get(name, id)
    }

    async fn create(&self, name: &str, payload: Record) -> Result<Record> {
        self.insert(name, payload)
    }

    async fn update(&self, name: &str, id: &RecordKey, payload: Record, mode: UpdateMode) -> Result<Record> {
        self.replace(name, id, payload, mode)
    }

    async fn remove(&self, name: &str, id: &RecordKey) -> Result<()> {
        self.delete(name, id).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use serde_json::json;

    fn store() -> InMemoryStore {
        InMemoryStore::from_json(json!({
            "classes": [
                { "id": "1", "libelle": "L1 Info", "state": "disponible" },
                { "id": 7, "libelle": "L2 Info", "state": "archivé" }
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_assigns_next_numeric_id_as_string() {
        let store = store();
        let created = store
            .create("classes", record!({ "libelle": "M1" }))
            .await
            .unwrap();
        assert_eq!(created.get("id"), Some(&json!("8")));
    }

    #[tokio::test]
    async fn partial_update_merges_and_full_update_replaces() {
        let store = store();
        let id = RecordKey::from(1);

        let patched = store
            .update("classes", &id, record!({ "state": "archivé" }), UpdateMode::Partial)
            .await
            .unwrap();
        assert_eq!(patched.get_str("libelle"), Some("L1 Info"));
        assert_eq!(patched.get_str("state"), Some("archivé"));

        let replaced = store
            .update("classes", &id, record!({ "libelle": "L1 Math" }), UpdateMode::Full)
            .await
            .unwrap();
        assert_eq!(replaced.get("state"), None);
        assert_eq!(replaced.get("id"), Some(&json!("1")));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = store();
        let id = RecordKey::from(7);
        store.remove("classes", &id).await.unwrap();
        store.remove("classes", &id).await.unwrap();
        assert_eq!(store.fetch_collection("classes").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_collections_surface_network_errors() {
        let store = store();
        store.fail_collection("classes").unwrap();
        let err = store.fetch_collection("classes").await.unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::Network);

        store.heal_collection("classes").unwrap();
        assert!(store.fetch_collection("classes").await.is_ok());
    }

    #[tokio::test]
    async fn fetch_counts_are_tracked_per_collection() {
        let store = store();
        store.fetch_collection("classes").await.unwrap();
        store
            .fetch_where("classes", &[("state".into(), "archivé".into())])
            .await
            .unwrap();
        assert_eq!(store.fetch_count("classes"), 2);
        assert_eq!(store.fetch_count("etudiants"), 0);
        assert!(matches!(
            store.fetch_collection("etudiants").await,
            Err(DashboardError::CollectionNotFound(_))
        ));
    }
}
