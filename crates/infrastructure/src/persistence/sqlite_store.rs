//! SQLite implementation of the import store.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use harbor_application::ports::{
    ImportStore, ImportTransaction, RecordReader, RequestRecord, StoredRequest, UpsertAction,
};
use harbor_domain::collection::CollectionInfo;
use harbor_domain::error::PersistenceError;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use tracing::warn;
use uuid::Uuid;

/// Maximum pooled connections for on-disk databases.
const MAX_CONNECTIONS: u32 = 5;

fn store_error(operation: &'static str) -> impl Fn(sqlx::Error) -> PersistenceError {
    move |e| PersistenceError::new(operation, e.to_string())
}

/// Import store backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteImportStore {
    pool: SqlitePool,
}

impl SqliteImportStore {
    /// Opens (creating if missing) the database at `path` in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or the database cannot be
    /// created.
    pub async fn connect(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistenceError::new("connect", e.to_string()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(store_error("connect"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(store_error("connect"))?;

        Ok(Self { pool })
    }

    /// Opens a private in-memory database. A single connection is used so
    /// every query sees the same database.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot be initialised.
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(store_error("connect"))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(store_error("connect"))?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the schema if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a DDL statement fails.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS collections (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                description TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(name, version)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(store_error("migrate"))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS request_records (
                id TEXT PRIMARY KEY,
                collection_name TEXT NOT NULL,
                collection_version TEXT NOT NULL,
                folder_path TEXT NOT NULL,
                name TEXT NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                headers_json TEXT NOT NULL DEFAULT '[]',
                body_json TEXT,
                auth_json TEXT,
                description TEXT,
                content_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(collection_name, collection_version, folder_path, name)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(store_error("migrate"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_request_records_collection \
             ON request_records(collection_name, collection_version)",
        )
        .execute(&self.pool)
        .await
        .map_err(store_error("migrate"))?;

        Ok(())
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl ImportStore for SqliteImportStore {
    type Transaction = SqliteImportTransaction;

    async fn begin(&self) -> Result<SqliteImportTransaction, PersistenceError> {
        let tx = self.pool.begin().await.map_err(store_error("begin"))?;
        Ok(SqliteImportTransaction { tx })
    }
}

/// An open import transaction. Dropping it without commit rolls back.
pub struct SqliteImportTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl ImportTransaction for SqliteImportTransaction {
    async fn upsert_collection(
        &mut self,
        info: &CollectionInfo,
    ) -> Result<UpsertAction, PersistenceError> {
        let conn: &mut SqliteConnection = &mut self.tx;
        let now = Utc::now().timestamp_millis();

        let existing: Option<(String, Option<String>)> = sqlx::query_as(
            "SELECT id, description FROM collections WHERE name = ? AND version = ?",
        )
        .bind(&info.name)
        .bind(&info.version)
        .fetch_optional(&mut *conn)
        .await
        .map_err(store_error("upsert_collection"))?;

        match existing {
            Some((_, description)) if description == info.description => {
                Ok(UpsertAction::Unchanged)
            }
            Some((id, _)) => {
                sqlx::query("UPDATE collections SET description = ?, updated_at = ? WHERE id = ?")
                    .bind(&info.description)
                    .bind(now)
                    .bind(&id)
                    .execute(&mut *conn)
                    .await
                    .map_err(store_error("upsert_collection"))?;
                Ok(UpsertAction::Updated)
            }
            None => {
                sqlx::query(
                    "INSERT INTO collections (id, name, version, description, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(Uuid::now_v7().to_string())
                .bind(&info.name)
                .bind(&info.version)
                .bind(&info.description)
                .bind(now)
                .bind(now)
                .execute(&mut *conn)
                .await
                .map_err(store_error("upsert_collection"))?;
                Ok(UpsertAction::Inserted)
            }
        }
    }

    async fn upsert_request(
        &mut self,
        record: &RequestRecord,
    ) -> Result<UpsertAction, PersistenceError> {
        // Each item gets its own savepoint so a failed statement leaves the
        // outer transaction intact.
        let mut savepoint = sqlx::Connection::begin(&mut *self.tx)
            .await
            .map_err(store_error("upsert_request"))?;

        match write_request(&mut savepoint, record).await {
            Ok(action) => {
                savepoint
                    .commit()
                    .await
                    .map_err(store_error("upsert_request"))?;
                Ok(action)
            }
            Err(e) => {
                if let Err(rollback) = savepoint.rollback().await {
                    warn!(error = %rollback, "savepoint rollback failed");
                }
                Err(PersistenceError::new("upsert_request", e.to_string()))
            }
        }
    }

    async fn commit(self) -> Result<(), PersistenceError> {
        self.tx.commit().await.map_err(store_error("commit"))
    }

    async fn rollback(self) -> Result<(), PersistenceError> {
        self.tx.rollback().await.map_err(store_error("rollback"))
    }
}

async fn write_request(
    conn: &mut SqliteConnection,
    record: &RequestRecord,
) -> Result<UpsertAction, sqlx::Error> {
    let existing: Option<(String, String)> = sqlx::query_as(
        "SELECT id, content_hash FROM request_records \
         WHERE collection_name = ? AND collection_version = ? AND folder_path = ? AND name = ?",
    )
    .bind(&record.collection_name)
    .bind(&record.collection_version)
    .bind(&record.folder_path)
    .bind(&record.name)
    .fetch_optional(&mut *conn)
    .await?;

    let now = Utc::now().timestamp_millis();
    match existing {
        Some((_, hash)) if hash == record.content_hash => Ok(UpsertAction::Unchanged),
        Some((id, _)) => {
            sqlx::query(
                r"
                UPDATE request_records SET
                    method = ?, url = ?, headers_json = ?, body_json = ?, auth_json = ?,
                    description = ?, content_hash = ?, updated_at = ?
                WHERE id = ?
                ",
            )
            .bind(&record.method)
            .bind(&record.url)
            .bind(&record.headers_json)
            .bind(&record.body_json)
            .bind(&record.auth_json)
            .bind(&record.description)
            .bind(&record.content_hash)
            .bind(now)
            .bind(&id)
            .execute(&mut *conn)
            .await?;
            Ok(UpsertAction::Updated)
        }
        None => {
            sqlx::query(
                r"
                INSERT INTO request_records (
                    id, collection_name, collection_version, folder_path, name, method, url,
                    headers_json, body_json, auth_json, description, content_hash,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(Uuid::now_v7().to_string())
            .bind(&record.collection_name)
            .bind(&record.collection_version)
            .bind(&record.folder_path)
            .bind(&record.name)
            .bind(&record.method)
            .bind(&record.url)
            .bind(&record.headers_json)
            .bind(&record.body_json)
            .bind(&record.auth_json)
            .bind(&record.description)
            .bind(&record.content_hash)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            Ok(UpsertAction::Inserted)
        }
    }
}

fn stored_request(row: &SqliteRow) -> Result<StoredRequest, sqlx::Error> {
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at: i64 = row.try_get("updated_at")?;

    Ok(StoredRequest {
        id: row.try_get("id")?,
        record: RequestRecord {
            collection_name: row.try_get("collection_name")?,
            collection_version: row.try_get("collection_version")?,
            folder_path: row.try_get("folder_path")?,
            name: row.try_get("name")?,
            method: row.try_get("method")?,
            url: row.try_get("url")?,
            headers_json: row.try_get("headers_json")?,
            body_json: row.try_get("body_json")?,
            auth_json: row.try_get("auth_json")?,
            description: row.try_get("description")?,
            content_hash: row.try_get("content_hash")?,
        },
        created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_default(),
        updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_default(),
    })
}

impl RecordReader for SqliteImportStore {
    async fn list_requests(
        &self,
        collection: &str,
        version: Option<&str>,
    ) -> Result<Vec<StoredRequest>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM request_records \
             WHERE collection_name = ? AND (? IS NULL OR collection_version = ?) \
             ORDER BY collection_version, folder_path, name",
        )
        .bind(collection)
        .bind(version)
        .bind(version)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("list_requests"))?;

        rows.iter()
            .map(stored_request)
            .collect::<Result<_, _>>()
            .map_err(store_error("list_requests"))
    }

    async fn count_requests(&self, collection: &str) -> Result<usize, PersistenceError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM request_records WHERE collection_name = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await
                .map_err(store_error("count_requests"))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, url: &str) -> RequestRecord {
        RequestRecord {
            collection_name: "Demo".into(),
            collection_version: "1.0.0".into(),
            folder_path: "users".into(),
            name: name.into(),
            method: "GET".into(),
            url: url.into(),
            headers_json: "[]".into(),
            body_json: None,
            auth_json: None,
            description: None,
            content_hash: harbor_application::ports::content_hash(
                "GET", url, "[]", None, None, None,
            ),
        }
    }

    async fn create_store() -> SqliteImportStore {
        let store = SqliteImportStore::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = create_store().await;
        store.migrate().await.unwrap();
        assert_eq!(store.count_requests("Demo").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_insert_update_unchanged() {
        let store = create_store().await;
        let info = CollectionInfo::new("Demo");

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.upsert_collection(&info).await.unwrap(), UpsertAction::Inserted);
        let first = record("List", "https://x/users");
        assert_eq!(tx.upsert_request(&first).await.unwrap(), UpsertAction::Inserted);
        tx.commit().await.unwrap();

        let before = store.list_requests("Demo", None).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.upsert_collection(&info).await.unwrap(), UpsertAction::Unchanged);
        assert_eq!(tx.upsert_request(&first).await.unwrap(), UpsertAction::Unchanged);
        let changed = record("List", "https://x/users?page=2");
        assert_eq!(tx.upsert_request(&changed).await.unwrap(), UpsertAction::Updated);
        tx.commit().await.unwrap();

        let after = store.list_requests("Demo", Some("1.0.0")).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[0].record.url, "https://x/users?page=2");
        assert_eq!(after[0].created_at, before[0].created_at);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = create_store().await;
        let mut tx = store.begin().await.unwrap();
        tx.upsert_collection(&CollectionInfo::new("Demo")).await.unwrap();
        tx.upsert_request(&record("A", "https://x/a")).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.count_requests("Demo").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = create_store().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.upsert_request(&record("A", "https://x/a")).await.unwrap();
        }
        assert_eq!(store.count_requests("Demo").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_item_does_not_poison_transaction() {
        let store = create_store().await;
        sqlx::query(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON request_records \
             WHEN NEW.name = 'bad' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_request(&record("good", "https://x/1")).await.unwrap();
        let err = tx.upsert_request(&record("bad", "https://x/2")).await.unwrap_err();
        assert_eq!(err.operation, "upsert_request");
        assert!(err.message.contains("rejected"));
        tx.upsert_request(&record("also good", "https://x/3")).await.unwrap();
        tx.commit().await.unwrap();

        let names: Vec<String> = store
            .list_requests("Demo", None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.record.name)
            .collect();
        assert_eq!(names, vec!["also good".to_string(), "good".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harbor.db");
        let store = SqliteImportStore::connect(&path).await.unwrap();
        store.migrate().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_request(&record("A", "https://x/a")).await.unwrap();
        tx.commit().await.unwrap();
        store.close().await;

        let reopened = SqliteImportStore::connect(&path).await.unwrap();
        assert_eq!(reopened.count_requests("Demo").await.unwrap(), 1);
    }
}
