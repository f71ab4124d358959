//! Session-scoped sync controller.
//!
//! Created when a user logs in and dropped on logout. Owns the session's
//! [`SyncGateway`], reconciles local and remote documents at login, pushes
//! local edits, and routes pushed remote snapshots into the state store.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};

use super::gateway::{GatewayError, GatewayOptions, SubscriptionHandle, SyncGateway};
use crate::models::{DataType, LinkCollection};
use crate::remote::DocumentStore;
use crate::state::StateHandle;
use crate::util::unix_millis_now;

/// Per-type outcome of a multi-type sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    outcomes: Vec<(DataType, bool)>,
}

impl SyncReport {
    pub fn outcomes(&self) -> &[(DataType, bool)] {
        &self.outcomes
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|(_, ok)| *ok)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DataType> {
        self.outcomes
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(data_type, _)| data_type)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &DataType> {
        self.outcomes
            .iter()
            .filter(|(_, ok)| *ok)
            .map(|(data_type, _)| data_type)
    }
}

impl FromIterator<(DataType, bool)> for SyncReport {
    fn from_iter<I: IntoIterator<Item = (DataType, bool)>>(iter: I) -> Self {
        Self {
            outcomes: iter.into_iter().collect(),
        }
    }
}

pub struct SyncController<S: DocumentStore> {
    gateway: SyncGateway<S>,
    state: StateHandle,
}

impl<S: DocumentStore> SyncController<S> {
    pub fn new(store: Arc<S>, state: StateHandle, options: GatewayOptions) -> Self {
        Self {
            gateway: SyncGateway::new(store, options),
            state,
        }
    }

    pub const fn gateway(&self) -> &SyncGateway<S> {
        &self.gateway
    }

    fn sync_enabled(&self) -> bool {
        self.state.read(|store| store.sync_status().enabled)
    }

    /// Bind to `user_id` and, if sync is on, reconcile then subscribe.
    ///
    /// Both data types are fetched concurrently. A remote document replaces
    /// the local value; a missing one is bootstrapped from local state; a
    /// failed fetch marks the type pending and keeps local state.
    pub async fn start(&self, user_id: &str) -> bool {
        if !self.gateway.init(user_id) {
            return false;
        }
        if !self.sync_enabled() {
            tracing::info!("Sync is disabled; skipping initial reconciliation");
            return true;
        }

        let report = self.pull_all().await;
        if !report.all_succeeded() {
            tracing::warn!(
                "Initial sync incomplete for: {}",
                report
                    .failed()
                    .map(DataType::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        self.subscribe_all().await;
        true
    }

    /// Fetch every synced type and apply what the remote holds.
    pub async fn pull_all(&self) -> SyncReport {
        let results = join_all(
            DataType::SYNCED
                .iter()
                .map(|data_type| self.reconcile(data_type)),
        )
        .await;
        DataType::SYNCED.into_iter().zip(results).collect()
    }

    async fn reconcile(&self, data_type: &DataType) -> bool {
        let Some(owner) = self.gateway.user_id() else {
            return false;
        };
        let fetched = self.gateway.fetch_document(data_type).await;
        if !self.owns_session(&owner) {
            tracing::debug!("Dropping {} fetch from an ended session", data_type);
            return false;
        }
        match fetched {
            Ok(Some(document)) => {
                apply_remote(&self.state, data_type, Some(document.payload));
                self.state
                    .update(|store| store.record_sync_success(data_type, unix_millis_now()));
                true
            }
            Ok(None) => {
                tracing::debug!("Bootstrapping remote {} document", data_type);
                self.push(data_type).await
            }
            Err(GatewayError::Unbound) => false,
            Err(error) => {
                tracing::warn!("Failed to load remote {}: {}", data_type, error);
                self.state
                    .update(|store| store.record_sync_failure(data_type.clone()));
                false
            }
        }
    }

    /// Upsert the local value of `data_type`. Records the outcome in the
    /// sync status. No-op (returns `false`) while sync is off or unbound.
    pub async fn push(&self, data_type: &DataType) -> bool {
        let Some(owner) = self.gateway.user_id() else {
            return false;
        };
        if !self.sync_enabled() || !self.owns_session(&owner) {
            return false;
        }
        let Some(payload) = self.state.read(|store| store.payload_for(data_type)) else {
            tracing::debug!("No local value to push for {}", data_type);
            return false;
        };

        let pushed = self.gateway.upsert_document(data_type, payload).await;
        if !self.owns_session(&owner) {
            tracing::debug!("Dropping {} push result from an ended session", data_type);
            return false;
        }
        if pushed {
            self.state
                .update(|store| store.record_sync_success(data_type, unix_millis_now()));
            true
        } else {
            self.state
                .update(|store| store.record_sync_failure(data_type.clone()));
            false
        }
    }

    /// Push every synced type concurrently.
    pub async fn sync_all(&self) -> SyncReport {
        let results =
            join_all(DataType::SYNCED.iter().map(|data_type| self.push(data_type))).await;
        DataType::SYNCED.into_iter().zip(results).collect()
    }

    /// React to a local edit of `data_type`.
    pub async fn on_local_change(&self, data_type: &DataType) -> bool {
        self.push(data_type).await
    }

    /// Turn sync on or off for this session.
    ///
    /// Turning it on pushes every synced type once and subscribes. Turning it
    /// off drops the subscriptions; nothing already pushed is withdrawn.
    pub async fn set_enabled(&self, enabled: bool) -> Option<SyncReport> {
        self.state.update(|store| store.set_sync_enabled(enabled));
        if !enabled {
            self.gateway.unsubscribe_all();
            return None;
        }
        if !self.gateway.is_bound() {
            return None;
        }
        let report = self.sync_all().await;
        self.subscribe_all().await;
        Some(report)
    }

    async fn subscribe_all(&self) {
        for data_type in DataType::SYNCED {
            if !self.sync_enabled() {
                return;
            }
            self.subscribe(data_type).await;
        }
    }

    /// Whether `owner` is still both the gateway's user and the signed-in
    /// identity. Results of remote calls started for anyone else are dropped.
    fn owns_session(&self, owner: &str) -> bool {
        self.gateway.user_id().as_deref() == Some(owner)
            && self.state.read(|store| {
                store.identity().map(|identity| identity.id.as_str()) == Some(owner)
            })
    }

    /// Subscribe to remote changes of `data_type`, applying each snapshot to
    /// the state store.
    pub async fn subscribe(&self, data_type: DataType) -> SubscriptionHandle {
        let state = self.state.clone();
        let routed = data_type.clone();
        let owner = self.gateway.user_id();
        self.gateway
            .subscribe_to_changes(data_type, move |payload| {
                let current =
                    state.read(|store| store.identity().map(|identity| identity.id.clone()));
                if current != owner {
                    tracing::debug!("Ignoring {} snapshot for a previous user", routed);
                    return;
                }
                apply_remote(&state, &routed, payload);
            })
            .await
    }

    /// Cancel subscriptions and unbind.
    pub fn shutdown(&self) {
        self.gateway.teardown();
    }
}

fn apply_remote(state: &StateHandle, data_type: &DataType, payload: Option<Map<String, Value>>) {
    let Some(payload) = payload else {
        tracing::debug!("Remote {} document is gone; keeping local value", data_type);
        return;
    };
    match data_type {
        DataType::Preferences => {
            state.update(|store| store.apply_remote_preferences(&payload));
        }
        DataType::Links => match LinkCollection::from_payload(&payload) {
            Some(links) => {
                state.update(|store| store.apply_remote_links(links));
            }
            None => tracing::warn!("Remote links document has no item list"),
        },
        DataType::Other(name) => {
            tracing::debug!("No local handler for remote {} document", name);
        }
    }
}
