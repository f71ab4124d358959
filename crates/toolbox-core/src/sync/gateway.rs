//! Remote sync gateway.
//!
//! Binds a [`DocumentStore`] to one user and exposes document reads, merge
//! writes, array edits and push subscriptions for that user's documents.
//!
//! Operations come in two flavors. The `try_*`/`fetch_*` methods return a
//! typed [`GatewayResult`]. The plain methods are fail-soft: they log remote
//! failures and return `None`/`false`, and they silently do nothing while the
//! gateway is unbound.
//!
//! At most one live subscription exists per data type. Each subscription owns
//! a cancellation token; once cancelled, its callback never runs again, even
//! if a snapshot is already in flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::DataType;
use crate::remote::{
    ArrayOp, DocumentPath, DocumentStore, RemoteDocument, RemoteError, RemoteResult,
    SnapshotStream,
};
use crate::util::normalize_text_option;

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Sync gateway is not bound to a user")]
    Unbound,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Tuning knobs for remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Upper bound for each remote call; `None` waits indefinitely.
    pub operation_timeout: Option<Duration>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
        }
    }
}

type SnapshotCallback = dyn Fn(Option<Map<String, Value>>) + Send + Sync;

/// Delivery end of one subscription.
pub struct SnapshotSink {
    data_type: DataType,
    token: CancellationToken,
    callback: Box<SnapshotCallback>,
}

impl std::fmt::Debug for SnapshotSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSink")
            .field("data_type", &self.data_type)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SnapshotSink {
    /// Hand a snapshot payload to the callback unless the subscription has
    /// been cancelled. Returns whether the callback ran.
    pub fn deliver(&self, payload: Option<Map<String, Value>>) -> bool {
        if self.token.is_cancelled() {
            tracing::debug!("Dropping stale {} snapshot", self.data_type);
            return false;
        }
        (self.callback)(payload);
        true
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

struct ActiveSubscription {
    id: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveSubscription {
    fn cancel(self) {
        self.token.cancel();
        self.task.abort();
    }
}

#[derive(Default)]
struct SubscriptionRegistry {
    next_id: u64,
    entries: HashMap<DataType, ActiveSubscription>,
}

impl SubscriptionRegistry {
    fn cancel_all(&mut self) {
        for (_, subscription) in self.entries.drain() {
            subscription.cancel();
        }
    }
}

/// Handle returned by [`SyncGateway::subscribe_to_changes`].
///
/// Unsubscribing is idempotent and never affects a newer subscription for the
/// same data type.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    data_type: DataType,
    token: CancellationToken,
    sink: Option<Arc<SnapshotSink>>,
    registry: Weak<Mutex<SubscriptionRegistry>>,
}

impl SubscriptionHandle {
    fn inert(data_type: DataType) -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self {
            id: 0,
            data_type,
            token,
            sink: None,
            registry: Weak::new(),
        }
    }

    pub const fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// The delivery end of this subscription, if one was established.
    pub fn sink(&self) -> Option<Arc<SnapshotSink>> {
        self.sink.clone()
    }

    pub fn unsubscribe(&self) {
        self.token.cancel();
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry
            .entries
            .get(&self.data_type)
            .is_some_and(|active| active.id == self.id)
        {
            if let Some(active) = registry.entries.remove(&self.data_type) {
                active.cancel();
            }
        }
    }
}

/// Per-session gateway to the remote document store.
pub struct SyncGateway<S: DocumentStore> {
    store: Arc<S>,
    options: GatewayOptions,
    user_id: Mutex<Option<String>>,
    epoch: AtomicU64,
    registry: Arc<Mutex<SubscriptionRegistry>>,
}

impl<S: DocumentStore> SyncGateway<S> {
    pub fn new(store: Arc<S>, options: GatewayOptions) -> Self {
        Self {
            store,
            options,
            user_id: Mutex::new(None),
            epoch: AtomicU64::new(0),
            registry: Arc::new(Mutex::new(SubscriptionRegistry::default())),
        }
    }

    /// Bind to `user_id`. Returns `false` and leaves the gateway untouched
    /// when the id is blank. Rebinding tears down every live subscription.
    pub fn init(&self, user_id: &str) -> bool {
        let Some(user_id) = normalize_text_option(Some(user_id.to_string())) else {
            tracing::debug!("Ignoring sync gateway init without a user id");
            return false;
        };

        self.cancel_subscriptions();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.lock_user() = Some(user_id);
        true
    }

    /// Unsubscribe everything and clear the binding. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.cancel_subscriptions();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.lock_user().take().is_some() {
            tracing::debug!("Sync gateway torn down");
        }
    }

    /// Cancel every live subscription but keep the binding. Subscriptions
    /// still being established are discarded once they resolve.
    pub fn unsubscribe_all(&self) {
        self.cancel_subscriptions();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn user_id(&self) -> Option<String> {
        self.lock_user().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.lock_user().is_some()
    }

    pub fn is_subscribed(&self, data_type: &DataType) -> bool {
        self.lock_registry().entries.contains_key(data_type)
    }

    pub fn subscription_count(&self) -> usize {
        self.lock_registry().entries.len()
    }

    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fetch a document, keeping "missing" and "failed" apart.
    pub async fn fetch_document(
        &self,
        data_type: &DataType,
    ) -> GatewayResult<Option<RemoteDocument>> {
        let path = self.path(data_type)?;
        Ok(self.run(self.store.get(&path)).await?)
    }

    /// Document payload, or `None` when unbound, missing, or on failure.
    pub async fn get_document(&self, data_type: &DataType) -> Option<Map<String, Value>> {
        match self.fetch_document(data_type).await {
            Ok(Some(document)) => Some(document.payload),
            Ok(None) => {
                tracing::debug!("No {} document found for user", data_type);
                None
            }
            Err(GatewayError::Unbound) => None,
            Err(error) => {
                tracing::warn!("Failed to fetch {} document: {}", data_type, error);
                None
            }
        }
    }

    pub async fn try_upsert_document(
        &self,
        data_type: &DataType,
        payload: Map<String, Value>,
    ) -> GatewayResult<()> {
        let path = self.path(data_type)?;
        Ok(self.run(self.store.set_merge(&path, payload)).await?)
    }

    /// Merge `payload` into the document. Returns whether the write succeeded.
    pub async fn upsert_document(&self, data_type: &DataType, payload: Map<String, Value>) -> bool {
        self.soften(
            self.try_upsert_document(data_type, payload).await,
            "save",
            data_type,
        )
    }

    pub async fn try_update_array(
        &self,
        data_type: &DataType,
        field: &str,
        ops: &[ArrayOp],
    ) -> GatewayResult<()> {
        let path = self.path(data_type)?;
        Ok(self.run(self.store.update_array(&path, field, ops)).await?)
    }

    /// Set-union `item` into `field`.
    pub async fn add_to_array_field(&self, data_type: &DataType, field: &str, item: Value) -> bool {
        let result = self
            .try_update_array(data_type, field, &[ArrayOp::Union(vec![item])])
            .await;
        self.soften(result, "add to", data_type)
    }

    /// Remove every element equal to `item` from `field`.
    pub async fn remove_from_array_field(
        &self,
        data_type: &DataType,
        field: &str,
        item: Value,
    ) -> bool {
        let result = self
            .try_update_array(data_type, field, &[ArrayOp::Remove(vec![item])])
            .await;
        self.soften(result, "remove from", data_type)
    }

    /// Swap `old_item` for `new_item` in `field` as one atomic store update.
    pub async fn replace_in_array_field(
        &self,
        data_type: &DataType,
        field: &str,
        old_item: Value,
        new_item: Value,
    ) -> bool {
        let ops = [
            ArrayOp::Remove(vec![old_item]),
            ArrayOp::Union(vec![new_item]),
        ];
        let result = self.try_update_array(data_type, field, &ops).await;
        self.soften(result, "update in", data_type)
    }

    /// Subscribe to pushed snapshots of one document.
    ///
    /// `callback` receives the current payload first, then the payload after
    /// every change (`None` once the document is deleted). Any previous
    /// subscription for `data_type` is torn down first. While unbound, or if
    /// the store refuses the subscription, an inactive handle is returned.
    pub async fn subscribe_to_changes<F>(&self, data_type: DataType, callback: F) -> SubscriptionHandle
    where
        F: Fn(Option<Map<String, Value>>) + Send + Sync + 'static,
    {
        let Ok(path) = self.path(&data_type) else {
            return SubscriptionHandle::inert(data_type);
        };

        self.cancel_subscription(&data_type);
        let epoch = self.epoch.load(Ordering::SeqCst);

        let stream = match self.run(self.store.subscribe(&path)).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!("Failed to listen for {} changes: {}", data_type, error);
                return SubscriptionHandle::inert(data_type);
            }
        };

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Discarding {} subscription from an ended session", data_type);
            return SubscriptionHandle::inert(data_type);
        }

        let token = CancellationToken::new();
        let sink = Arc::new(SnapshotSink {
            data_type: data_type.clone(),
            token: token.clone(),
            callback: Box::new(callback),
        });

        let mut registry = self.lock_registry();
        if let Some(previous) = registry.entries.remove(&data_type) {
            previous.cancel();
        }
        registry.next_id += 1;
        let id = registry.next_id;
        let task = tokio::spawn(forward_snapshots(stream, Arc::clone(&sink)));
        registry.entries.insert(
            data_type.clone(),
            ActiveSubscription {
                id,
                token: token.clone(),
                task,
            },
        );
        drop(registry);

        tracing::debug!("Listening for {} changes", data_type);
        SubscriptionHandle {
            id,
            data_type,
            token,
            sink: Some(sink),
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn path(&self, data_type: &DataType) -> GatewayResult<DocumentPath> {
        self.lock_user()
            .as_ref()
            .map(|user_id| DocumentPath::new(user_id.clone(), data_type.clone()))
            .ok_or(GatewayError::Unbound)
    }

    async fn run<T>(&self, operation: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        match self.options.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| RemoteError::Timeout(limit))?,
            None => operation.await,
        }
    }

    fn soften(&self, result: GatewayResult<()>, action: &str, data_type: &DataType) -> bool {
        match result {
            Ok(()) => true,
            Err(GatewayError::Unbound) => false,
            Err(error) => {
                tracing::warn!("Failed to {} {} document: {}", action, data_type, error);
                false
            }
        }
    }

    fn cancel_subscription(&self, data_type: &DataType) {
        if let Some(previous) = self.lock_registry().entries.remove(data_type) {
            tracing::debug!("Replacing existing {} subscription", data_type);
            previous.cancel();
        }
    }

    fn cancel_subscriptions(&self) {
        self.lock_registry().cancel_all();
    }

    fn lock_user(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.user_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, SubscriptionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: DocumentStore> Drop for SyncGateway<S> {
    fn drop(&mut self) {
        self.cancel_subscriptions();
    }
}

async fn forward_snapshots(mut stream: SnapshotStream, sink: Arc<SnapshotSink>) {
    loop {
        tokio::select! {
            biased;
            () = sink.token.cancelled() => break,
            snapshot = stream.recv() => match snapshot {
                Some(snapshot) => {
                    sink.deliver(snapshot.map(|document| document.payload));
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LINKS_FIELD;
    use crate::remote::MemoryDocumentStore;
    use crate::test_support::GatedDocumentStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn bound_gateway() -> (Arc<MemoryDocumentStore>, SyncGateway<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        let gateway = SyncGateway::new(Arc::clone(&store), GatewayOptions::default());
        assert!(gateway.init("user-1"));
        (store, gateway)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn init_rejects_blank_user_ids() {
        let store = Arc::new(MemoryDocumentStore::new());
        let gateway = SyncGateway::new(store, GatewayOptions::default());
        assert!(!gateway.init(""));
        assert!(!gateway.init("   "));
        assert!(!gateway.is_bound());
    }

    #[tokio::test]
    async fn unbound_operations_are_silent_no_ops() {
        let store = Arc::new(MemoryDocumentStore::new());
        let gateway = SyncGateway::new(Arc::clone(&store), GatewayOptions::default());

        assert_eq!(gateway.get_document(&DataType::Preferences).await, None);
        assert!(!gateway.upsert_document(&DataType::Preferences, Map::new()).await);
        assert!(matches!(
            gateway.fetch_document(&DataType::Links).await,
            Err(GatewayError::Unbound)
        ));
        let handle = gateway
            .subscribe_to_changes(DataType::Links, |_| panic!("must not be called"))
            .await;
        assert!(!handle.is_active());
        handle.unsubscribe();
    }

    #[tokio::test]
    async fn missing_document_then_upsert_round_trips_for_every_type() {
        let (_store, gateway) = bound_gateway();
        let types = [
            DataType::Preferences,
            DataType::Links,
            DataType::Other("notes".to_string()),
        ];
        for data_type in types {
            assert_eq!(gateway.get_document(&data_type).await, None);
            let local = object(json!({"value": data_type.as_str(), "nested": {"n": [1, 2]}}));
            assert!(gateway.upsert_document(&data_type, local.clone()).await);
            assert_eq!(gateway.get_document(&data_type).await, Some(local));
        }
    }

    #[tokio::test]
    async fn remote_failures_are_typed_and_softened() {
        let (store, gateway) = bound_gateway();
        store.set_offline(true);

        assert!(matches!(
            gateway.fetch_document(&DataType::Preferences).await,
            Err(GatewayError::Remote(RemoteError::Unavailable(_)))
        ));
        assert_eq!(gateway.get_document(&DataType::Preferences).await, None);
        assert!(!gateway.upsert_document(&DataType::Preferences, Map::new()).await);
    }

    #[tokio::test]
    async fn array_helpers_use_value_equality() {
        let (store, gateway) = bound_gateway();
        let links = DataType::Links;
        assert!(
            gateway
                .upsert_document(&links, object(json!({"items": [{"url": "a"}]})))
                .await
        );

        assert!(gateway.add_to_array_field(&links, LINKS_FIELD, json!({"url": "b"})).await);
        assert!(gateway.add_to_array_field(&links, LINKS_FIELD, json!({"url": "a"})).await);
        assert!(
            gateway
                .replace_in_array_field(&links, LINKS_FIELD, json!({"url": "a"}), json!({"url": "c"}))
                .await
        );

        let path = DocumentPath::new("user-1", links.clone());
        let document = store.document(&path).unwrap();
        assert_eq!(
            document.payload["items"],
            json!([{"url": "b"}, {"url": "c"}])
        );
    }

    #[tokio::test]
    async fn removing_absent_item_succeeds_without_mutation() {
        let (store, gateway) = bound_gateway();
        let links = DataType::Links;
        gateway
            .upsert_document(&links, object(json!({"items": ["x", "y"]})))
            .await;

        assert!(
            gateway
                .remove_from_array_field(&links, LINKS_FIELD, json!("missing"))
                .await
        );

        let path = DocumentPath::new("user-1", links);
        assert_eq!(store.document(&path).unwrap().payload["items"], json!(["x", "y"]));
    }

    #[tokio::test]
    async fn array_update_on_missing_document_fails_soft() {
        let (_store, gateway) = bound_gateway();
        assert!(!gateway.add_to_array_field(&DataType::Links, LINKS_FIELD, json!(1)).await);
    }

    #[tokio::test]
    async fn subscription_delivers_initial_and_later_snapshots() {
        let (_store, gateway) = bound_gateway();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let handle = gateway
            .subscribe_to_changes(DataType::Preferences, move |payload| {
                sink.lock().unwrap().push(payload);
            })
            .await;
        settle().await;
        gateway
            .upsert_document(&DataType::Preferences, object(json!({"theme": "red"})))
            .await;
        settle().await;

        assert!(handle.is_active());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some(object(json!({"theme": "red"})))]
        );
    }

    #[tokio::test]
    async fn second_subscription_replaces_first() {
        let (store, gateway) = bound_gateway();
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first_calls);
        let first = gateway
            .subscribe_to_changes(DataType::Links, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        let counter = Arc::clone(&second_calls);
        let second = gateway
            .subscribe_to_changes(DataType::Links, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        settle().await;

        assert!(!first.is_active());
        assert!(second.is_active());
        assert_eq!(gateway.subscription_count(), 1);

        first.unsubscribe();
        first.unsubscribe();
        assert!(second.is_active());
        assert!(gateway.is_subscribed(&DataType::Links));

        gateway
            .upsert_document(&DataType::Links, object(json!({"items": []})))
            .await;
        settle().await;
        let path = DocumentPath::new("user-1", DataType::Links);
        assert_eq!(store.live_subscriptions(&path), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 2);

        second.unsubscribe();
        second.unsubscribe();
        assert_eq!(gateway.subscription_count(), 0);
    }

    #[tokio::test]
    async fn teardown_cancels_sinks_and_is_idempotent() {
        let (_store, gateway) = bound_gateway();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = gateway
            .subscribe_to_changes(DataType::Preferences, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        settle().await;
        let before = calls.load(Ordering::SeqCst);
        let sink = handle.sink().unwrap();

        gateway.teardown();
        gateway.teardown();

        assert!(!gateway.is_bound());
        assert_eq!(gateway.subscription_count(), 0);
        assert!(!sink.deliver(Some(object(json!({"theme": "late"})))));
        assert_eq!(calls.load(Ordering::SeqCst), before);
        handle.unsubscribe();
    }

    struct StalledStore;

    impl DocumentStore for StalledStore {
        async fn get(&self, _path: &DocumentPath) -> RemoteResult<Option<RemoteDocument>> {
            std::future::pending().await
        }

        async fn set_merge(
            &self,
            _path: &DocumentPath,
            _fields: Map<String, Value>,
        ) -> RemoteResult<()> {
            std::future::pending().await
        }

        async fn update_array(
            &self,
            _path: &DocumentPath,
            _field: &str,
            _ops: &[ArrayOp],
        ) -> RemoteResult<()> {
            std::future::pending().await
        }

        async fn subscribe(&self, _path: &DocumentPath) -> RemoteResult<SnapshotStream> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_store_times_out_as_remote_failure() {
        let options = GatewayOptions {
            operation_timeout: Some(Duration::from_millis(20)),
        };
        let gateway = SyncGateway::new(Arc::new(StalledStore), options);
        assert!(gateway.init("user-1"));

        assert!(matches!(
            gateway.fetch_document(&DataType::Preferences).await,
            Err(GatewayError::Remote(RemoteError::Timeout(_)))
        ));
        assert!(!gateway.upsert_document(&DataType::Links, Map::new()).await);
        let handle = gateway.subscribe_to_changes(DataType::Links, |_| {}).await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn unsubscribe_all_discards_a_subscription_still_being_opened() {
        let store = Arc::new(GatedDocumentStore::new());
        let gateway = SyncGateway::new(Arc::clone(&store), GatewayOptions::default());
        assert!(gateway.init("user-1"));

        let interrupt = async {
            store.entered().await;
            gateway.unsubscribe_all();
            store.release();
        };
        let (handle, ()) = tokio::join!(
            gateway.subscribe_to_changes(DataType::Links, |_| panic!("must not be called")),
            interrupt
        );
        settle().await;

        assert!(!handle.is_active());
        assert_eq!(gateway.subscription_count(), 0);
        assert!(gateway.is_bound());
        let path = DocumentPath::new("user-1", DataType::Links);
        assert_eq!(store.inner().live_subscriptions(&path), 0);
    }

    #[tokio::test]
    async fn teardown_discards_a_subscription_still_being_opened() {
        let store = Arc::new(GatedDocumentStore::new());
        let gateway = SyncGateway::new(Arc::clone(&store), GatewayOptions::default());
        assert!(gateway.init("user-1"));

        let interrupt = async {
            store.entered().await;
            gateway.teardown();
            store.release();
        };
        let (handle, ()) = tokio::join!(
            gateway.subscribe_to_changes(DataType::Preferences, |_| {}),
            interrupt
        );

        assert!(!handle.is_active());
        assert_eq!(gateway.subscription_count(), 0);
    }

    #[tokio::test]
    async fn rebinding_tears_down_previous_user_subscriptions() {
        let (_store, gateway) = bound_gateway();
        let handle = gateway
            .subscribe_to_changes(DataType::Links, |_| {})
            .await;
        assert!(gateway.init("user-2"));
        assert!(!handle.is_active());
        assert_eq!(gateway.user_id().as_deref(), Some("user-2"));
        assert_eq!(gateway.subscription_count(), 0);
    }
}
