//! In-process document store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};

use super::hub::SubscriberHub;
use super::{
    apply_array_ops, merge_fields, ArrayOp, DocumentPath, DocumentStore, RemoteDocument,
    RemoteError, RemoteResult, SnapshotStream, StoreClock,
};

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<DocumentPath, RemoteDocument>,
    writes: HashMap<DocumentPath, usize>,
    clock: StoreClock,
    offline: bool,
}

/// Document store kept entirely in memory.
///
/// Used for offline sessions and tests. Connectivity loss can be simulated
/// with [`MemoryDocumentStore::set_offline`].
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
    hub: SubscriberHub,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every operation fails with [`RemoteError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.offline = offline;
        }
    }

    /// Create or overwrite a document directly, notifying subscribers.
    pub fn seed(&self, path: &DocumentPath, payload: Map<String, Value>) {
        if let Ok(mut state) = self.state.lock() {
            let updated_at = state.clock.tick();
            let document = RemoteDocument {
                payload,
                updated_at,
            };
            state.documents.insert(path.clone(), document.clone());
            self.hub.publish(path, &Some(document));
        }
    }

    /// Delete a document, notifying subscribers with an empty snapshot.
    pub fn delete(&self, path: &DocumentPath) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let removed = state.documents.remove(path).is_some();
        if removed {
            self.hub.publish(path, &None);
        }
        removed
    }

    /// Current contents without going through the async API.
    pub fn document(&self, path: &DocumentPath) -> Option<RemoteDocument> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.documents.get(path).cloned())
    }

    /// Number of successful writes applied to `path`.
    pub fn write_count(&self, path: &DocumentPath) -> usize {
        self.state
            .lock()
            .map_or(0, |state| state.writes.get(path).copied().unwrap_or(0))
    }

    /// Number of open snapshot streams for `path`.
    pub fn live_subscriptions(&self, path: &DocumentPath) -> usize {
        self.hub.live_count(path)
    }

    fn lock_online(&self) -> RemoteResult<MutexGuard<'_, MemoryState>> {
        let state = self
            .state
            .lock()
            .map_err(|_| RemoteError::Unavailable("memory store lock poisoned".to_string()))?;
        if state.offline {
            return Err(RemoteError::Unavailable("memory store is offline".to_string()));
        }
        Ok(state)
    }

    fn commit(&self, state: &mut MemoryState, path: &DocumentPath, payload: Map<String, Value>) {
        let updated_at = state.clock.tick();
        let document = RemoteDocument {
            payload,
            updated_at,
        };
        state.documents.insert(path.clone(), document.clone());
        *state.writes.entry(path.clone()).or_default() += 1;
        self.hub.publish(path, &Some(document));
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocumentPath) -> RemoteResult<Option<RemoteDocument>> {
        let state = self.lock_online()?;
        Ok(state.documents.get(path).cloned())
    }

    async fn set_merge(
        &self,
        path: &DocumentPath,
        fields: Map<String, Value>,
    ) -> RemoteResult<()> {
        let mut state = self.lock_online()?;
        let mut payload = state
            .documents
            .get(path)
            .map(|document| document.payload.clone())
            .unwrap_or_default();
        merge_fields(&mut payload, fields);
        self.commit(&mut state, path, payload);
        Ok(())
    }

    async fn update_array(
        &self,
        path: &DocumentPath,
        field: &str,
        ops: &[ArrayOp],
    ) -> RemoteResult<()> {
        let mut state = self.lock_online()?;
        let mut payload = state
            .documents
            .get(path)
            .map(|document| document.payload.clone())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        apply_array_ops(path, &mut payload, field, ops)?;
        self.commit(&mut state, path, payload);
        Ok(())
    }

    async fn subscribe(&self, path: &DocumentPath) -> RemoteResult<SnapshotStream> {
        let state = self.lock_online()?;
        let initial = state.documents.get(path).cloned();
        Ok(self.hub.register(path, initial))
    }
}
