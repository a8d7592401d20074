//! Import store ports.

use std::future::Future;

use chrono::{DateTime, Utc};
use harbor_domain::collection::CollectionInfo;
use harbor_domain::error::PersistenceError;
use harbor_domain::request::ResolvedRequest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Persisted form of a resolved request.
///
/// The natural key is `(collection_name, collection_version, folder_path,
/// name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Owning collection name.
    pub collection_name: String,
    /// Owning collection version.
    pub collection_version: String,
    /// `/`-joined folder path, empty at the root.
    pub folder_path: String,
    /// Request name.
    pub name: String,
    /// HTTP method.
    pub method: String,
    /// Fully substituted URL.
    pub url: String,
    /// Headers as a JSON array of `{key, value}`.
    pub headers_json: String,
    /// Body as JSON, if any.
    pub body_json: Option<String>,
    /// Auth configuration as JSON, if any.
    pub auth_json: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// SHA-256 over the request content, used to skip no-op updates.
    pub content_hash: String,
}

impl RequestRecord {
    /// Builds the record for a resolved request of the given collection.
    ///
    /// # Errors
    ///
    /// Returns an error if a request part cannot be encoded as JSON.
    pub fn from_resolved(
        info: &CollectionInfo,
        request: &ResolvedRequest,
    ) -> Result<Self, PersistenceError> {
        let headers_json = encode(&request.headers)?;
        let body_json = request.body.as_ref().map(encode).transpose()?;
        let auth_json = request.auth.as_ref().map(encode).transpose()?;
        let hash = content_hash(
            &request.method,
            &request.url,
            &headers_json,
            body_json.as_deref(),
            auth_json.as_deref(),
            request.description.as_deref(),
        );

        Ok(Self {
            collection_name: info.name.clone(),
            collection_version: info.version.clone(),
            folder_path: request.folder_path.clone(),
            name: request.name.clone(),
            method: request.method.clone(),
            url: request.url.clone(),
            headers_json,
            body_json,
            auth_json,
            description: request.description.clone(),
            content_hash: hash,
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, PersistenceError> {
    serde_json::to_string(value).map_err(|e| PersistenceError::new("encode_request", e.to_string()))
}

/// Computes the content hash of a request record.
#[must_use]
pub fn content_hash(
    method: &str,
    url: &str,
    headers_json: &str,
    body_json: Option<&str>,
    auth_json: Option<&str>,
    description: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    for part in [
        Some(method),
        Some(url),
        Some(headers_json),
        body_json,
        auth_json,
        description,
    ] {
        match part {
            Some(text) => {
                hasher.update([1u8]);
                hasher.update((text.len() as u64).to_le_bytes());
                hasher.update(text.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    format!("{:x}", hasher.finalize())
}

/// A request record as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRequest {
    /// Store-assigned identifier, stable across re-imports.
    pub id: String,
    /// The persisted content.
    #[serde(flatten)]
    pub record: RequestRecord,
    /// When the record was first inserted.
    pub created_at: DateTime<Utc>,
    /// When the record content last changed.
    pub updated_at: DateTime<Utc>,
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    /// No record had the natural key.
    Inserted,
    /// An existing record was overwritten with new content.
    Updated,
    /// An existing record already had identical content.
    Unchanged,
}

/// Store that can open import transactions.
pub trait ImportStore: Send + Sync {
    /// Transaction type; rolls back when dropped without commit.
    type Transaction: ImportTransaction;

    /// Opens a new transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, PersistenceError>> + Send;
}

/// One open import transaction.
///
/// Each `upsert_request` call is isolated: when it fails, nothing it wrote
/// survives and the transaction stays usable.
pub trait ImportTransaction: Send {
    /// Inserts or updates the collection record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert_collection(
        &mut self,
        info: &CollectionInfo,
    ) -> impl Future<Output = Result<UpsertAction, PersistenceError>> + Send;

    /// Inserts or updates one request by natural key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert_request(
        &mut self,
        record: &RequestRecord,
    ) -> impl Future<Output = Result<UpsertAction, PersistenceError>> + Send;

    /// Makes every write durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; nothing is durable then.
    fn commit(self) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Discards every write.
    ///
    /// # Errors
    ///
    /// Returns an error if the store reports a failure while rolling back.
    fn rollback(self) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Read access to persisted request records.
pub trait RecordReader: Send + Sync {
    /// Lists the records of a collection, ordered by folder path and name.
    /// When `version` is `None`, every version is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_requests(
        &self,
        collection: &str,
        version: Option<&str>,
    ) -> impl Future<Output = Result<Vec<StoredRequest>, PersistenceError>> + Send;

    /// Counts the records of a collection across all versions.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn count_requests(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<usize, PersistenceError>> + Send;
}
