//! In-memory implementation of the import store.
//!
//! Writes are staged per transaction and applied on commit. Faults can be
//! injected to exercise the importer's failure handling.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use harbor_application::ports::{
    ImportStore, ImportTransaction, RecordReader, RequestRecord, StoredRequest, UpsertAction,
};
use harbor_domain::collection::CollectionInfo;
use harbor_domain::error::PersistenceError;
use uuid::Uuid;

/// `(collection, version, folder_path, name)`
type NaturalKey = (String, String, String, String);

fn natural_key(record: &RequestRecord) -> NaturalKey {
    (
        record.collection_name.clone(),
        record.collection_version.clone(),
        record.folder_path.clone(),
        record.name.clone(),
    )
}

#[derive(Debug, Default)]
struct MemoryState {
    /// `(name, version)` to description
    collections: BTreeMap<(String, String), Option<String>>,
    requests: BTreeMap<NaturalKey, StoredRequest>,
}

#[derive(Debug, Default, Clone)]
struct Faults {
    begin: bool,
    commit: bool,
    request_names: HashSet<String>,
}

/// Import store that keeps everything in process memory.
///
/// Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryImportStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Faults,
    begun: Arc<AtomicUsize>,
}

impl InMemoryImportStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `upsert_request` fail for requests with any of these names.
    #[must_use]
    pub fn with_failing_requests<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.faults
            .request_names
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Makes `begin` fail.
    #[must_use]
    pub const fn with_failing_begin(mut self) -> Self {
        self.faults.begin = true;
        self
    }

    /// Makes `commit` fail.
    #[must_use]
    pub const fn with_failing_commit(mut self) -> Self {
        self.faults.commit = true;
        self
    }

    /// Number of transactions opened so far.
    #[must_use]
    pub fn transactions_begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    /// Whether a collection record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn has_collection(&self, name: &str, version: &str) -> Result<bool, PersistenceError> {
        let state = lock(&self.state, "has_collection")?;
        Ok(state
            .collections
            .contains_key(&(name.to_string(), version.to_string())))
    }
}

fn lock<'a>(
    state: &'a Mutex<MemoryState>,
    operation: &'static str,
) -> Result<MutexGuard<'a, MemoryState>, PersistenceError> {
    state
        .lock()
        .map_err(|_| PersistenceError::new(operation, "store state lock poisoned"))
}

impl ImportStore for InMemoryImportStore {
    type Transaction = MemoryImportTransaction;

    async fn begin(&self) -> Result<MemoryImportTransaction, PersistenceError> {
        if self.faults.begin {
            return Err(PersistenceError::new("begin", "store unavailable"));
        }
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryImportTransaction {
            state: Arc::clone(&self.state),
            faults: self.faults.clone(),
            collections: Vec::new(),
            requests: BTreeMap::new(),
        })
    }
}

/// Staged writes of one in-memory transaction.
#[derive(Debug)]
pub struct MemoryImportTransaction {
    state: Arc<Mutex<MemoryState>>,
    faults: Faults,
    collections: Vec<CollectionInfo>,
    requests: BTreeMap<NaturalKey, RequestRecord>,
}

impl ImportTransaction for MemoryImportTransaction {
    async fn upsert_collection(
        &mut self,
        info: &CollectionInfo,
    ) -> Result<UpsertAction, PersistenceError> {
        let key = (info.name.clone(), info.version.clone());
        let staged = self
            .collections
            .iter()
            .rev()
            .find(|c| c.name == info.name && c.version == info.version)
            .map(|c| c.description.clone());
        let existing = match staged {
            Some(description) => Some(description),
            None => lock(&self.state, "upsert_collection")?
                .collections
                .get(&key)
                .cloned(),
        };

        let action = match existing {
            Some(description) if description == info.description => UpsertAction::Unchanged,
            Some(_) => UpsertAction::Updated,
            None => UpsertAction::Inserted,
        };
        if action != UpsertAction::Unchanged {
            self.collections.push(info.clone());
        }
        Ok(action)
    }

    async fn upsert_request(
        &mut self,
        record: &RequestRecord,
    ) -> Result<UpsertAction, PersistenceError> {
        if self.faults.request_names.contains(&record.name) {
            return Err(PersistenceError::new(
                "upsert_request",
                format!("write rejected for '{}'", record.name),
            ));
        }

        let key = natural_key(record);
        let existing_hash = match self.requests.get(&key) {
            Some(staged) => Some(staged.content_hash.clone()),
            None => lock(&self.state, "upsert_request")?
                .requests
                .get(&key)
                .map(|stored| stored.record.content_hash.clone()),
        };

        let action = match existing_hash {
            Some(hash) if hash == record.content_hash => return Ok(UpsertAction::Unchanged),
            Some(_) => UpsertAction::Updated,
            None => UpsertAction::Inserted,
        };
        self.requests.insert(key, record.clone());
        Ok(action)
    }

    async fn commit(self) -> Result<(), PersistenceError> {
        if self.faults.commit {
            return Err(PersistenceError::new("commit", "commit rejected"));
        }

        let mut state = lock(&self.state, "commit")?;
        for info in self.collections {
            state
                .collections
                .insert((info.name, info.version), info.description);
        }

        let now = Utc::now();
        for (key, record) in self.requests {
            match state.requests.get_mut(&key) {
                Some(stored) => {
                    if stored.record.content_hash != record.content_hash {
                        stored.record = record;
                        stored.updated_at = now;
                    }
                }
                None => {
                    state.requests.insert(
                        key,
                        StoredRequest {
                            id: Uuid::now_v7().to_string(),
                            record,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

impl RecordReader for InMemoryImportStore {
    async fn list_requests(
        &self,
        collection: &str,
        version: Option<&str>,
    ) -> Result<Vec<StoredRequest>, PersistenceError> {
        let state = lock(&self.state, "list_requests")?;
        Ok(state
            .requests
            .values()
            .filter(|r| r.record.collection_name == collection)
            .filter(|r| version.is_none_or(|v| r.record.collection_version == v))
            .cloned()
            .collect())
    }

    async fn count_requests(&self, collection: &str) -> Result<usize, PersistenceError> {
        let state = lock(&self.state, "count_requests")?;
        Ok(state
            .requests
            .values()
            .filter(|r| r.record.collection_name == collection)
            .count())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use harbor_application::ports::content_hash;
    use pretty_assertions::assert_eq;

    fn record(name: &str, url: &str) -> RequestRecord {
        RequestRecord {
            collection_name: "Demo".into(),
            collection_version: "1.0.0".into(),
            folder_path: String::new(),
            name: name.into(),
            method: "GET".into(),
            url: url.into(),
            headers_json: "[]".into(),
            body_json: None,
            auth_json: None,
            description: None,
            content_hash: content_hash("GET", url, "[]", None, None, None),
        }
    }

    #[tokio::test]
    async fn test_writes_visible_only_after_commit() {
        let store = InMemoryImportStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.upsert_collection(&CollectionInfo::new("Demo")).await.unwrap(),
            UpsertAction::Inserted
        );
        tx.upsert_request(&record("a", "https://x/a")).await.unwrap();
        assert_eq!(store.count_requests("Demo").await.unwrap(), 0);

        tx.commit().await.unwrap();
        assert_eq!(store.count_requests("Demo").await.unwrap(), 1);
        assert!(store.has_collection("Demo", "1.0.0").unwrap());
        assert_eq!(store.transactions_begun(), 1);
    }

    #[tokio::test]
    async fn test_upsert_actions_and_stable_id() {
        let store = InMemoryImportStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_request(&record("a", "https://x/a")).await.unwrap();
        tx.commit().await.unwrap();
        let first = store.list_requests("Demo", None).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.upsert_request(&record("a", "https://x/a")).await.unwrap(),
            UpsertAction::Unchanged
        );
        assert_eq!(
            tx.upsert_request(&record("a", "https://x/a2")).await.unwrap(),
            UpsertAction::Updated
        );
        tx.commit().await.unwrap();

        let second = store.list_requests("Demo", Some("1.0.0")).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].record.url, "https://x/a2");
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let store = InMemoryImportStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_request(&record("a", "https://x/a")).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(store.count_requests("Demo").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = InMemoryImportStore::new().with_failing_requests(["bad"]);
        let mut tx = store.begin().await.unwrap();
        let err = tx.upsert_request(&record("bad", "https://x")).await.unwrap_err();
        assert_eq!(err.operation, "upsert_request");
        tx.upsert_request(&record("good", "https://x")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.count_requests("Demo").await.unwrap(), 1);

        assert!(InMemoryImportStore::new().with_failing_begin().begin().await.is_err());

        let store = InMemoryImportStore::new().with_failing_commit();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_request(&record("a", "https://x")).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert_eq!(store.count_requests("Demo").await.unwrap(), 0);
    }
}
