//! Remote per-user document store.
//!
//! Documents are addressed as `users/{user_id}/data/{data_type}` and hold a
//! JSON object plus a store-assigned update timestamp. Writes merge at the top
//! level. Subscribers receive the current snapshot immediately and then one
//! snapshot per change, in update order.

mod hub;
mod libsql_store;
mod memory;

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::DataType;

pub use libsql_store::{LibSqlDocumentStore, SyncConfig};
pub use memory::MemoryDocumentStore;

/// Root collection holding one entry per user.
pub const USERS_COLLECTION: &str = "users";
/// Per-user subcollection holding one document per data type.
pub const DATA_SUBCOLLECTION: &str = "data";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
    #[error("Remote operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid document {path}: {reason}")]
    InvalidDocument { path: String, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Address of one remote document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    user_id: String,
    data_type: DataType,
}

impl DocumentPath {
    pub fn new(user_id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            user_id: user_id.into(),
            data_type,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub const fn data_type(&self) -> &DataType {
        &self.data_type
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{USERS_COLLECTION}/{}/{DATA_SUBCOLLECTION}/{}",
            self.user_id, self.data_type
        )
    }
}

/// Stored document contents.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    /// Document fields, without the store timestamp
    pub payload: Map<String, Value>,
    /// Store-assigned update time (unix ms)
    pub updated_at: i64,
}

/// Latest state of a document; `None` when it does not exist.
pub type Snapshot = Option<RemoteDocument>;

/// Stream of snapshots for one subscribed document.
pub type SnapshotStream = mpsc::UnboundedReceiver<Snapshot>;

/// Field-level array mutation with value equality.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayOp {
    /// Append each value not already present
    Union(Vec<Value>),
    /// Remove every element equal to one of the values
    Remove(Vec<Value>),
}

/// Backend contract for the remote document store.
#[allow(async_fn_in_trait)]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch a document; `Ok(None)` when it does not exist.
    async fn get(&self, path: &DocumentPath) -> RemoteResult<Option<RemoteDocument>>;

    /// Merge `fields` into the document, creating it when missing.
    async fn set_merge(&self, path: &DocumentPath, fields: Map<String, Value>)
        -> RemoteResult<()>;

    /// Apply `ops` in order to one array field, as a single atomic update.
    ///
    /// Fails with [`RemoteError::NotFound`] when the document does not exist.
    async fn update_array(&self, path: &DocumentPath, field: &str, ops: &[ArrayOp])
        -> RemoteResult<()>;

    /// Open a snapshot stream, starting with the current state.
    async fn subscribe(&self, path: &DocumentPath) -> RemoteResult<SnapshotStream>;
}

/// Shallow merge of `fields` into `target`.
pub(crate) fn merge_fields(target: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (key, value) in fields {
        target.insert(key, value);
    }
}

/// Apply array ops to `field` of `target`. Returns whether the field changed.
///
/// A missing or null field starts out empty; any other non-array value is
/// rejected and left untouched.
pub(crate) fn apply_array_ops(
    path: &DocumentPath,
    target: &mut Map<String, Value>,
    field: &str,
    ops: &[ArrayOp],
) -> RemoteResult<bool> {
    let original = target.get(field).cloned();
    let mut items = match &original {
        Some(Value::Array(items)) => items.clone(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            return Err(RemoteError::InvalidDocument {
                path: path.to_string(),
                reason: format!("field {field} is not an array"),
            })
        }
    };

    for op in ops {
        match op {
            ArrayOp::Union(values) => {
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
            ArrayOp::Remove(values) => items.retain(|item| !values.contains(item)),
        }
    }

    let updated = Value::Array(items);
    let changed = original.as_ref() != Some(&updated);
    target.insert(field.to_string(), updated);
    Ok(changed)
}

/// Monotonic store clock in unix ms.
#[derive(Debug, Default)]
pub(crate) struct StoreClock {
    last: i64,
}

impl StoreClock {
    pub(crate) fn tick(&mut self) -> i64 {
        let now = crate::util::unix_millis_now().max(self.last + 1);
        self.last = now;
        now
    }

    pub(crate) fn observe(&mut self, at: i64) {
        self.last = self.last.max(at);
    }
}
