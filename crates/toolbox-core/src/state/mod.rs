//! Application state store.
//!
//! Holds the session-visible state (identity, auth flags, preferences,
//! pinned links, sync status) and persists the durable subset to the local
//! cache on every change. Each mutation goes through a named transition that
//! bumps [`AppStore::revision`].

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::Locale;
use crate::cache::{CachedValue, LocalCache};
use crate::models::{
    DataType, Identity, LinkCollection, LinkItem, PreferenceKey, PreferenceUpdate, Preferences,
    SyncStatus,
};

/// Cache key of the persisted state subset.
pub const STATE_CACHE_KEY: &str = "toolbox.state";
/// Cache key of the pinned links collection.
pub const LINKS_CACHE_KEY: &str = "toolbox.links";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    identity: Option<Identity>,
    #[serde(default)]
    preferences: Preferences,
    #[serde(default)]
    sync_status: SyncStatus,
}

/// Serializable copy of the whole store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub identity: Option<Identity>,
    pub is_logged_in: bool,
    pub display_name: String,
    pub auth_ready: bool,
    pub auth_error: Option<String>,
    pub preferences: Preferences,
    pub links: LinkCollection,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeScope {
    /// Transient session flags, never written to the cache
    Session,
    /// Fields of the persisted state subset
    Persisted,
    /// Links, already written through by their cached value
    Links,
}

#[derive(Debug)]
pub struct AppStore {
    cache: LocalCache,
    identity: Option<Identity>,
    auth_ready: bool,
    auth_error: Option<String>,
    preferences: Preferences,
    sync_status: SyncStatus,
    links: CachedValue<LinkCollection>,
    revision: u64,
}

impl AppStore {
    /// Load from `cache`, seeding defaults for anything missing.
    pub fn load(cache: LocalCache, sync_enabled_by_default: bool) -> Self {
        let fallback = PersistedState {
            identity: None,
            preferences: Preferences::default(),
            sync_status: SyncStatus::new(sync_enabled_by_default),
        };
        let persisted = cache.get(STATE_CACHE_KEY, fallback);
        let links = cache.bind(LINKS_CACHE_KEY, LinkCollection::new());

        Self {
            cache,
            identity: persisted.identity,
            auth_ready: false,
            auth_error: None,
            preferences: persisted.preferences,
            sync_status: persisted.sync_status,
            links,
            revision: 0,
        }
    }

    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub const fn is_logged_in(&self) -> bool {
        self.identity.is_some()
    }

    /// Display name, falling back to the email, then to a localized
    /// placeholder.
    pub fn display_name(&self) -> String {
        self.identity
            .as_ref()
            .and_then(|identity| {
                identity
                    .display_name
                    .clone()
                    .or_else(|| identity.email.clone())
            })
            .unwrap_or_else(|| self.locale().anonymous_user().to_string())
    }

    pub fn user_email(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .and_then(|identity| identity.email.as_deref())
    }

    pub const fn auth_ready(&self) -> bool {
        self.auth_ready
    }

    pub fn auth_error(&self) -> Option<&str> {
        self.auth_error.as_deref()
    }

    pub const fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub const fn links(&self) -> &LinkCollection {
        self.links.get()
    }

    pub const fn sync_status(&self) -> &SyncStatus {
        &self.sync_status
    }

    pub fn locale(&self) -> Locale {
        Locale::from_language(&self.preferences.language)
    }

    /// Monotonic counter bumped by every state change.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            identity: self.identity.clone(),
            is_logged_in: self.is_logged_in(),
            display_name: self.display_name(),
            auth_ready: self.auth_ready,
            auth_error: self.auth_error.clone(),
            preferences: self.preferences.clone(),
            links: self.links.get().clone(),
            sync_status: self.sync_status.clone(),
        }
    }

    /// Local payload pushed for `data_type`, if this store owns one.
    pub fn payload_for(&self, data_type: &DataType) -> Option<Map<String, Value>> {
        match data_type {
            DataType::Preferences => Some(self.preferences.to_payload()),
            DataType::Links => Some(self.links.get().to_payload()),
            DataType::Other(_) => None,
        }
    }

    pub fn set_identity(&mut self, identity: Option<Identity>) {
        if self.identity != identity {
            self.identity = identity;
            self.changed(ChangeScope::Persisted);
        }
    }

    /// Flip the auth-ready flag. Returns `true` only the first time.
    pub fn mark_auth_ready(&mut self) -> bool {
        if self.auth_ready {
            return false;
        }
        self.auth_ready = true;
        self.changed(ChangeScope::Session);
        true
    }

    pub fn set_auth_error(&mut self, message: impl Into<String>) {
        self.auth_error = Some(message.into());
        self.changed(ChangeScope::Session);
    }

    pub fn clear_auth_error(&mut self) {
        if self.auth_error.take().is_some() {
            self.changed(ChangeScope::Session);
        }
    }

    /// Apply a local preference edit. Returns whether the value changed.
    pub fn set_preference(&mut self, update: &PreferenceUpdate) -> bool {
        if !self.preferences.apply(update) {
            return false;
        }
        self.cache
            .set(update.key().legacy_cache_key(), &update.to_json());
        self.changed(ChangeScope::Persisted);
        true
    }

    /// Merge a remote preferences payload over the local record.
    pub fn apply_remote_preferences(&mut self, payload: &Map<String, Value>) -> bool {
        let merged = self.preferences.merged_with_payload(payload);
        if merged == self.preferences {
            return false;
        }
        for key in PreferenceKey::ALL {
            let before = self.preferences.value_of(key);
            let after = merged.value_of(key);
            if before != after {
                self.cache.set(key.legacy_cache_key(), &after);
            }
        }
        self.preferences = merged;
        self.changed(ChangeScope::Persisted);
        true
    }

    pub fn add_link(&mut self, item: LinkItem) -> bool {
        let added = self.links.update(|links| links.add(item));
        if added {
            self.changed(ChangeScope::Links);
        }
        added
    }

    pub fn remove_link(&mut self, item: &LinkItem) -> bool {
        let removed = self.links.update(|links| links.remove(item));
        if removed {
            self.changed(ChangeScope::Links);
        }
        removed
    }

    pub fn replace_link(&mut self, old: &LinkItem, new: LinkItem) -> bool {
        let replaced = self.links.update(|links| links.replace(old, new));
        if replaced {
            self.changed(ChangeScope::Links);
        }
        replaced
    }

    /// Take the remote links collection as-is.
    pub fn apply_remote_links(&mut self, links: LinkCollection) -> bool {
        if *self.links.get() == links {
            return false;
        }
        self.links.set(links);
        self.changed(ChangeScope::Links);
        true
    }

    pub fn set_sync_enabled(&mut self, enabled: bool) -> bool {
        if self.sync_status.enabled == enabled {
            return false;
        }
        self.sync_status.enabled = enabled;
        self.changed(ChangeScope::Persisted);
        true
    }

    pub fn record_sync_success(&mut self, data_type: &DataType, at: i64) {
        self.sync_status.mark_synced(data_type, at);
        self.changed(ChangeScope::Persisted);
    }

    pub fn record_sync_failure(&mut self, data_type: DataType) {
        self.sync_status.mark_pending(data_type);
        self.changed(ChangeScope::Persisted);
    }

    fn changed(&mut self, scope: ChangeScope) {
        self.revision += 1;
        if scope == ChangeScope::Persisted {
            self.persist();
        }
    }

    fn persist(&self) {
        let persisted = PersistedState {
            identity: self.identity.clone(),
            preferences: self.preferences.clone(),
            sync_status: self.sync_status.clone(),
        };
        self.cache.set(STATE_CACHE_KEY, &persisted);
    }
}

/// Shared, lock-protected handle to the [`AppStore`].
///
/// The lock is never held across an await point.
#[derive(Debug, Clone)]
pub struct StateHandle(Arc<Mutex<AppStore>>);

impl StateHandle {
    pub fn new(store: AppStore) -> Self {
        Self(Arc::new(Mutex::new(store)))
    }

    pub fn read<R>(&self, read: impl FnOnce(&AppStore) -> R) -> R {
        let store = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        read(&store)
    }

    pub fn update<R>(&self, update: impl FnOnce(&mut AppStore) -> R) -> R {
        let mut store = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut store)
    }

    pub fn revision(&self) -> u64 {
        self.read(AppStore::revision)
    }
}
