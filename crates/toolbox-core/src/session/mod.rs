//! Session lifecycle.
//!
//! `SessionManager` ties the identity provider, the application state store
//! and the per-session [`SyncController`] together. A controller exists only
//! while a user is signed in: it is created on login and shut down on
//! logout, before the identity is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::auth::{AuthAction, AuthError, AuthFailure, IdentityProvider};
use crate::cache::LocalCache;
use crate::models::{DataType, Identity, LinkItem, PreferenceUpdate, ProfileUpdate};
use crate::remote::DocumentStore;
use crate::state::{AppStore, StateHandle, StateSnapshot};
use crate::sync::{GatewayOptions, SyncController, SyncReport};
use crate::util::normalize_text_option;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Sync flag used when no state has been cached yet
    pub sync_enabled_by_default: bool,
    pub gateway: GatewayOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            sync_enabled_by_default: true,
            gateway: GatewayOptions::default(),
        }
    }
}

pub struct SessionManager<P: IdentityProvider, S: DocumentStore> {
    provider: P,
    documents: Arc<S>,
    state: StateHandle,
    gateway_options: GatewayOptions,
    controller: Mutex<Option<Arc<SyncController<S>>>>,
    started: AtomicBool,
    ready: watch::Sender<bool>,
    auth_state: watch::Sender<Option<Identity>>,
}

impl<P: IdentityProvider, S: DocumentStore> SessionManager<P, S> {
    pub fn new(provider: P, documents: Arc<S>, cache: LocalCache, options: SessionOptions) -> Self {
        let store = AppStore::load(cache, options.sync_enabled_by_default);
        let (ready, _) = watch::channel(false);
        let (auth_state, _) = watch::channel(None);
        Self {
            provider,
            documents,
            state: StateHandle::new(store),
            gateway_options: options.gateway,
            controller: Mutex::new(None),
            started: AtomicBool::new(false),
            ready,
            auth_state,
        }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    pub const fn documents(&self) -> &Arc<S> {
        &self.documents
    }

    pub const fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.read(AppStore::snapshot)
    }

    /// Controller of the signed-in session, if any.
    pub fn controller(&self) -> Option<Arc<SyncController<S>>> {
        self.lock_controller().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait for the first auth-state resolution.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.ready.subscribe();
        // The sender lives as long as `self`, so this only returns once ready.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Identity changes, starting with the current value.
    pub fn auth_state(&self) -> watch::Receiver<Option<Identity>> {
        self.auth_state.subscribe()
    }

    /// Restore the persisted identity and signal readiness. Only the first
    /// call does anything.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let restored = match self.provider.restore().await {
            Ok(identity) => identity,
            Err(error) => {
                tracing::warn!("Failed to restore session: {}", error);
                None
            }
        };

        match restored {
            Some(identity) => self.enter_session(identity).await,
            None => {
                self.state.update(|store| store.set_identity(None));
                self.auth_state.send_replace(None);
                self.mark_ready();
            }
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, AuthFailure> {
        self.state.update(AppStore::clear_auth_error);
        let identity = self
            .provider
            .create_account(email, password)
            .await
            .map_err(|error| self.fail(AuthAction::Register, &error))?;

        let identity = match normalize_text_option(display_name.map(str::to_string)) {
            Some(display_name) => {
                let update = ProfileUpdate {
                    display_name: Some(display_name),
                    photo_url: None,
                };
                match self.provider.update_profile(&update).await {
                    Ok(updated) => updated,
                    Err(error) => {
                        tracing::warn!("Account created but display name not saved: {}", error);
                        identity
                    }
                }
            }
            None => identity,
        };

        self.enter_session(identity.clone()).await;
        Ok(identity)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthFailure> {
        self.state.update(AppStore::clear_auth_error);
        let identity = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(|error| self.fail(AuthAction::Login, &error))?;
        self.enter_session(identity.clone()).await;
        Ok(identity)
    }

    /// Tear down the session's sync, sign out, then clear the identity.
    /// Provider sign-out failures are logged; the local session always ends.
    pub async fn logout(&self) {
        self.end_sync();
        if let Err(error) = self.provider.sign_out().await {
            tracing::warn!("Sign-out failed: {}", error);
        }
        self.state.update(|store| store.set_identity(None));
        self.auth_state.send_replace(None);
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthFailure> {
        self.state.update(AppStore::clear_auth_error);
        self.provider
            .send_reset_link(email)
            .await
            .map_err(|error| self.fail(AuthAction::ResetPassword, &error))
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Identity, AuthFailure> {
        let identity = self
            .provider
            .update_profile(update)
            .await
            .map_err(|error| self.fail(AuthAction::UpdateProfile, &error))?;
        self.state
            .update(|store| store.set_identity(Some(identity.clone())));
        self.auth_state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    /// Apply a preference change and push it when sync is on.
    pub async fn set_preference(&self, update: &PreferenceUpdate) -> bool {
        let changed = self.state.update(|store| store.set_preference(update));
        if changed {
            self.after_local_change(&DataType::Preferences).await;
        }
        changed
    }

    pub async fn add_link(&self, item: LinkItem) -> bool {
        let added = self.state.update(|store| store.add_link(item));
        if added {
            self.after_local_change(&DataType::Links).await;
        }
        added
    }

    pub async fn remove_link(&self, item: &LinkItem) -> bool {
        let removed = self.state.update(|store| store.remove_link(item));
        if removed {
            self.after_local_change(&DataType::Links).await;
        }
        removed
    }

    pub async fn replace_link(&self, old: &LinkItem, new: LinkItem) -> bool {
        let replaced = self.state.update(|store| store.replace_link(old, new));
        if replaced {
            self.after_local_change(&DataType::Links).await;
        }
        replaced
    }

    /// Flip the sync flag. Returns the push report when turning sync on
    /// while signed in.
    pub async fn toggle_sync(&self, enabled: bool) -> Option<SyncReport> {
        match self.controller() {
            Some(controller) => controller.set_enabled(enabled).await,
            None => {
                self.state.update(|store| store.set_sync_enabled(enabled));
                None
            }
        }
    }

    pub async fn sync_all(&self) -> Option<SyncReport> {
        let controller = self.controller()?;
        Some(controller.sync_all().await)
    }

    pub async fn sync_now(&self, data_type: &DataType) -> bool {
        match self.controller() {
            Some(controller) => controller.push(data_type).await,
            None => false,
        }
    }

    pub async fn pull_all(&self) -> Option<SyncReport> {
        let controller = self.controller()?;
        Some(controller.pull_all().await)
    }

    async fn enter_session(&self, identity: Identity) {
        self.end_sync();
        let user_id = identity.id.clone();
        self.state
            .update(|store| store.set_identity(Some(identity.clone())));
        self.auth_state.send_replace(Some(identity));
        self.mark_ready();

        let controller = Arc::new(SyncController::new(
            Arc::clone(&self.documents),
            self.state.clone(),
            self.gateway_options.clone(),
        ));
        *self.lock_controller() = Some(Arc::clone(&controller));
        if !controller.start(&user_id).await {
            tracing::warn!("Signed-in identity has no usable id; sync stays off");
            self.end_sync();
        }
    }

    fn end_sync(&self) {
        if let Some(controller) = self.lock_controller().take() {
            controller.shutdown();
        }
    }

    async fn after_local_change(&self, data_type: &DataType) {
        if let Some(controller) = self.controller() {
            controller.on_local_change(data_type).await;
        }
    }

    fn mark_ready(&self) {
        if self.state.update(AppStore::mark_auth_ready) {
            self.ready.send_replace(true);
            tracing::debug!("Auth state ready");
        }
    }

    fn fail(&self, action: AuthAction, error: &AuthError) -> AuthFailure {
        tracing::warn!("{:?} failed: {}", action, error);
        let locale = self.state.read(AppStore::locale);
        let failure = AuthFailure::from_error(action, error, locale);
        self.state
            .update(|store| store.set_auth_error(failure.message.clone()));
        failure
    }

    fn lock_controller(&self) -> MutexGuard<'_, Option<Arc<SyncController<S>>>> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
