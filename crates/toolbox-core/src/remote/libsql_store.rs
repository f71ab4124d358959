//! libSQL-backed document store.
//!
//! Runs against a local database file or a Turso embedded replica. Writes made
//! through this instance are pushed to subscribers immediately; changes made by
//! other devices reach subscribers after [`LibSqlDocumentStore::refresh`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use libsql::{Builder, Connection, Database};
use serde_json::{Map, Value};

use super::hub::SubscriberHub;
use super::{
    apply_array_ops, merge_fields, ArrayOp, DocumentPath, DocumentStore, RemoteDocument,
    RemoteError, RemoteResult, SnapshotStream, StoreClock,
};

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Configuration for embedded replica sync
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Remote database URL (e.g., `libsql://your-db.turso.io`)
    pub url: Option<String>,
    /// Authentication token for remote database
    pub auth_token: Option<String>,
    /// Automatic replica sync interval
    pub sync_interval: Option<Duration>,
}

impl SyncConfig {
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            auth_token: Some(auth_token.into()),
            sync_interval: Some(Duration::from_secs(60)),
        }
    }

    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Disable automatic sync (explicit refresh only)
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    pub const fn is_configured(&self) -> bool {
        self.url.is_some() && self.auth_token.is_some()
    }
}

/// Document store persisted in a libSQL database.
pub struct LibSqlDocumentStore {
    db: Database,
    conn: Connection,
    replicated: bool,
    write_lock: tokio::sync::Mutex<StoreClock>,
    hub: SubscriberHub,
    published: Mutex<HashMap<DocumentPath, Option<i64>>>,
}

impl std::fmt::Debug for LibSqlDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibSqlDocumentStore")
            .field("replicated", &self.replicated)
            .finish_non_exhaustive()
    }
}

impl LibSqlDocumentStore {
    /// Open a local database at `path`, creating it if it doesn't exist.
    pub async fn open(path: impl AsRef<Path>) -> RemoteResult<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::initialize(db, false).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> RemoteResult<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::initialize(db, false).await
    }

    /// Open an embedded replica of a remote Turso database.
    ///
    /// Reads are served from the local file; writes go to the remote and sync back.
    pub async fn open_with_sync(
        local_path: impl AsRef<Path>,
        sync_config: SyncConfig,
    ) -> RemoteResult<Self> {
        let path_str = local_path.as_ref().to_string_lossy().to_string();
        let (Some(url), Some(token)) = (sync_config.url.clone(), sync_config.auth_token.clone())
        else {
            return Err(RemoteError::Unavailable(
                "replica sync requires a database URL and auth token".to_string(),
            ));
        };

        let mut builder = Builder::new_remote_replica(&path_str, url, token);
        if let Some(interval) = sync_config.sync_interval {
            builder = builder.sync_interval(interval);
            tracing::debug!("Automatic replica sync interval set to {:?}", interval);
        }
        let db = builder.build().await?;

        // Pull the remote schema first so migrations only fill the gaps.
        db.sync().await?;
        Self::initialize(db, true).await
    }

    async fn initialize(db: Database, replicated: bool) -> RemoteResult<Self> {
        let conn = db.connect()?;
        configure(&conn).await?;
        migrate(&conn).await?;

        let mut clock = StoreClock::default();
        let mut rows = conn
            .query("SELECT COALESCE(MAX(updated_at), 0) FROM user_documents", ())
            .await?;
        if let Some(row) = rows.next().await? {
            clock.observe(row.get::<i64>(0)?);
        }

        Ok(Self {
            db,
            conn,
            replicated,
            write_lock: tokio::sync::Mutex::new(clock),
            hub: SubscriberHub::default(),
            published: Mutex::new(HashMap::new()),
        })
    }

    pub const fn is_replicated(&self) -> bool {
        self.replicated
    }

    /// Pull remote changes (replicas only) and notify subscribers whose
    /// documents changed since they last heard about them.
    ///
    /// Returns the number of documents that produced a new snapshot.
    pub async fn refresh(&self) -> RemoteResult<usize> {
        if self.replicated {
            self.db.sync().await?;
            tracing::debug!("Document replica synced with remote");
        }

        let watched = self.hub.watched_paths();
        if let Ok(mut published) = self.published.lock() {
            published.retain(|path, _| watched.contains(path));
        }

        let mut notified = 0;
        for path in watched {
            let snapshot = self.read(&path).await?;
            let seen = snapshot.as_ref().map(|document| document.updated_at);
            let previous = self
                .published
                .lock()
                .ok()
                .and_then(|published| published.get(&path).copied());
            if previous != Some(seen) {
                self.remember(&path, seen);
                self.hub.publish(&path, &snapshot);
                notified += 1;
            }
        }
        Ok(notified)
    }

    async fn read(&self, path: &DocumentPath) -> RemoteResult<Option<RemoteDocument>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload, updated_at FROM user_documents WHERE user_id = ? AND data_type = ?",
                [path.user_id(), path.data_type().as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let raw: String = row.get(0)?;
        let updated_at: i64 = row.get(1)?;
        let payload = match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => map,
            other => {
                return Err(RemoteError::InvalidDocument {
                    path: path.to_string(),
                    reason: format!("expected a JSON object, found {other}"),
                })
            }
        };
        Ok(Some(RemoteDocument {
            payload,
            updated_at,
        }))
    }

    async fn write(
        &self,
        clock: &mut StoreClock,
        path: &DocumentPath,
        payload: Map<String, Value>,
    ) -> RemoteResult<()> {
        let updated_at = clock.tick();
        let raw = serde_json::to_string(&payload)?;
        self.conn
            .execute(
                "INSERT INTO user_documents (user_id, data_type, payload, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(user_id, data_type)
                 DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
                libsql::params![
                    path.user_id().to_string(),
                    path.data_type().as_str().to_string(),
                    raw,
                    updated_at
                ],
            )
            .await?;

        self.remember(path, Some(updated_at));
        self.hub.publish(
            path,
            &Some(RemoteDocument {
                payload,
                updated_at,
            }),
        );
        Ok(())
    }

    fn remember(&self, path: &DocumentPath, updated_at: Option<i64>) {
        if let Ok(mut published) = self.published.lock() {
            published.insert(path.clone(), updated_at);
        }
    }
}

impl DocumentStore for LibSqlDocumentStore {
    async fn get(&self, path: &DocumentPath) -> RemoteResult<Option<RemoteDocument>> {
        self.read(path).await
    }

    async fn set_merge(
        &self,
        path: &DocumentPath,
        fields: Map<String, Value>,
    ) -> RemoteResult<()> {
        let mut clock = self.write_lock.lock().await;
        let mut payload = self
            .read(path)
            .await?
            .map(|document| document.payload)
            .unwrap_or_default();
        merge_fields(&mut payload, fields);
        self.write(&mut clock, path, payload).await
    }

    async fn update_array(
        &self,
        path: &DocumentPath,
        field: &str,
        ops: &[ArrayOp],
    ) -> RemoteResult<()> {
        let mut clock = self.write_lock.lock().await;
        let mut payload = self
            .read(path)
            .await?
            .map(|document| document.payload)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        apply_array_ops(path, &mut payload, field, ops)?;
        self.write(&mut clock, path, payload).await
    }

    async fn subscribe(&self, path: &DocumentPath) -> RemoteResult<SnapshotStream> {
        let _writes = self.write_lock.lock().await;
        let initial = self.read(path).await?;
        self.remember(path, initial.as_ref().map(|document| document.updated_at));
        Ok(self.hub.register(path, initial))
    }
}

/// Configure `SQLite` pragmas; some are unsupported on replicas and ignored.
async fn configure(conn: &Connection) -> RemoteResult<()> {
    conn.execute("PRAGMA journal_mode = WAL;", ()).await.ok();
    conn.execute("PRAGMA synchronous = NORMAL;", ()).await.ok();
    Ok(())
}

/// Run all pending migrations
async fn migrate(conn: &Connection) -> RemoteResult<()> {
    let version = schema_version(conn).await?;
    if version > CURRENT_VERSION {
        tracing::warn!(
            "Document store schema version {} is newer than supported version {}",
            version,
            CURRENT_VERSION
        );
        return Ok(());
    }
    if version < 1 {
        migrate_v1(conn).await?;
    }
    Ok(())
}

async fn schema_version(conn: &Connection) -> RemoteResult<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;
    let exists = match rows.next().await? {
        Some(row) => row.get::<i32>(0)? != 0,
        None => false,
    };
    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

/// Migration to version 1: per-user documents
async fn migrate_v1(conn: &Connection) -> RemoteResult<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS user_documents (
            user_id TEXT NOT NULL,
            data_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, data_type)
        )",
        "CREATE INDEX IF NOT EXISTS idx_user_documents_updated ON user_documents(updated_at DESC)",
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for statement in statements {
        if let Err(error) = conn.execute(statement, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }
    }

    conn.execute("COMMIT", ()).await?;
    tracing::debug!("Migrated document store schema to version 1");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataType;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::env;
    use tempfile::tempdir;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_sync_config_new() {
        let config = SyncConfig::new("libsql://test.turso.io", "test-token");
        assert!(config.is_configured());
        assert!(!SyncConfig::default().is_configured());
        assert_eq!(config.without_auto_sync().sync_interval, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_and_array_updates_round_trip() {
        let store = LibSqlDocumentStore::open_in_memory().await.unwrap();
        let path = DocumentPath::new("u1", DataType::Links);

        store
            .set_merge(&path, object(json!({"items": ["a"], "label": "pinned"})))
            .await
            .unwrap();
        store
            .update_array(
                &path,
                "items",
                &[
                    ArrayOp::Remove(vec![json!("a")]),
                    ArrayOp::Union(vec![json!("b")]),
                ],
            )
            .await
            .unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(
            Value::Object(doc.payload),
            json!({"items": ["b"], "label": "pinned"})
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_array_on_missing_document_is_not_found() {
        let store = LibSqlDocumentStore::open_in_memory().await.unwrap();
        let path = DocumentPath::new("u1", DataType::Links);
        let result = store
            .update_array(&path, "items", &[ArrayOp::Union(vec![json!(1)])])
            .await;
        assert!(matches!(result, Err(RemoteError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn documents_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("documents.db");
        let path = DocumentPath::new("u1", DataType::Preferences);

        {
            let store = LibSqlDocumentStore::open(&db_path).await.unwrap();
            store
                .set_merge(&path, object(json!({"fontSize": 120})))
                .await
                .unwrap();
        }

        let reopened = LibSqlDocumentStore::open(&db_path).await.unwrap();
        let doc = reopened.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.payload["fontSize"], json!(120));
        assert!(!reopened.is_replicated());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_only_notifies_changed_documents() {
        let store = LibSqlDocumentStore::open_in_memory().await.unwrap();
        let path = DocumentPath::new("u1", DataType::Preferences);

        let mut stream = store.subscribe(&path).await.unwrap();
        assert_eq!(stream.recv().await.unwrap(), None);
        assert_eq!(store.refresh().await.unwrap(), 0);

        // Simulate a write from another device landing in the replica.
        store
            .conn
            .execute(
                "INSERT INTO user_documents (user_id, data_type, payload, updated_at) VALUES ('u1', 'preferences', '{\"theme\":\"red\"}', 5)",
                (),
            )
            .await
            .unwrap();

        assert_eq!(store.refresh().await.unwrap(), 1);
        let doc = stream.recv().await.unwrap().unwrap();
        assert_eq!(doc.payload["theme"], json!("red"));
        assert_eq!(store.refresh().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_forgets_documents_nobody_watches() {
        let store = LibSqlDocumentStore::open_in_memory().await.unwrap();
        let watched = DocumentPath::new("u1", DataType::Preferences);
        let dropped = DocumentPath::new("u1", DataType::Links);
        let unwatched = DocumentPath::new("u2", DataType::Preferences);

        let mut stream = store.subscribe(&watched).await.unwrap();
        drop(store.subscribe(&dropped).await.unwrap());
        store
            .set_merge(&unwatched, object(json!({"theme": "red"})))
            .await
            .unwrap();
        assert_eq!(store.published.lock().unwrap().len(), 3);

        assert_eq!(store.refresh().await.unwrap(), 0);

        let published = store.published.lock().unwrap();
        assert_eq!(published.keys().collect::<Vec<_>>(), vec![&watched]);
        drop(published);
        assert_eq!(stream.recv().await.unwrap(), None);
    }

    /// Run with: TURSO_DATABASE_URL=... TURSO_AUTH_TOKEN=... cargo test replica_with_turso -- --ignored
    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "Requires TURSO_DATABASE_URL and TURSO_AUTH_TOKEN"]
    async fn replica_with_turso() {
        let url = env::var("TURSO_DATABASE_URL").expect("TURSO_DATABASE_URL must be set");
        let token = env::var("TURSO_AUTH_TOKEN").expect("TURSO_AUTH_TOKEN must be set");

        let tmp = tempdir().unwrap();
        let store = LibSqlDocumentStore::open_with_sync(
            tmp.path().join("replica.db"),
            SyncConfig::new(url, token),
        )
        .await
        .unwrap();
        assert!(store.is_replicated());
        store.refresh().await.expect("refresh should succeed");
    }
}
