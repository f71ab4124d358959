//! In-process test doubles: an identity provider and a document store whose
//! reads can be held open.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{Map, Value};
use tokio::sync::{Notify, Semaphore};

use crate::auth::{AuthError, AuthFailureKind, AuthResult, IdentityProvider};
use crate::models::{Identity, ProfileUpdate};
use crate::remote::{
    ArrayOp, DocumentPath, DocumentStore, MemoryDocumentStore, RemoteDocument, RemoteResult,
    SnapshotStream,
};

#[derive(Debug, Default)]
pub(crate) struct FakeIdentityProvider {
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    current: Mutex<Option<Identity>>,
    restore_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    fail_sign_out: AtomicBool,
}

impl FakeIdentityProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_account(self, email: &str, password: &str) -> Self {
        let identity = Identity::new(format!("uid-{email}")).with_email(email);
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), identity));
        self
    }

    /// Make `restore` report `email` as already signed in.
    pub(crate) fn signed_in_as(self, email: &str) -> Self {
        let identity = self.accounts.lock().unwrap().get(email).map(|(_, id)| id.clone());
        *self.current.lock().unwrap() = identity;
        self
    }

    pub(crate) fn failing_sign_out(self) -> Self {
        self.fail_sign_out.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn restore_calls(&self) -> usize {
        self.restore_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for FakeIdentityProvider {
    async fn restore(&self) -> AuthResult<Option<Identity>> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.lock().unwrap().clone())
    }

    async fn create_account(&self, email: &str, password: &str) -> AuthResult<Identity> {
        if !email.contains('@') {
            return Err(AuthError::rejected(AuthFailureKind::InvalidHandle, "bad email"));
        }
        if password.len() < 6 {
            return Err(AuthError::rejected(AuthFailureKind::WeakSecret, "weak"));
        }
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(AuthError::rejected(AuthFailureKind::DuplicateAccount, "exists"));
        }
        let identity = Identity::new(format!("uid-{email}")).with_email(email);
        accounts.insert(email.to_string(), (password.to_string(), identity.clone()));
        *self.current.lock().unwrap() = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let accounts = self.accounts.lock().unwrap();
        let Some((stored, identity)) = accounts.get(email) else {
            return Err(AuthError::rejected(AuthFailureKind::AccountNotFound, "unknown"));
        };
        if stored != password {
            return Err(AuthError::rejected(AuthFailureKind::BadCredentials, "wrong"));
        }
        *self.current.lock().unwrap() = Some(identity.clone());
        Ok(identity.clone())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = None;
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AuthError::Api("logout endpoint unavailable".to_string()));
        }
        Ok(())
    }

    async fn send_reset_link(&self, email: &str) -> AuthResult<()> {
        if self.accounts.lock().unwrap().contains_key(email) {
            Ok(())
        } else {
            Err(AuthError::rejected(AuthFailureKind::AccountNotFound, "unknown"))
        }
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> AuthResult<Identity> {
        let mut current = self.current.lock().unwrap();
        let identity = current.as_mut().ok_or(AuthError::NotSignedIn)?;
        if let Some(display_name) = &update.display_name {
            identity.display_name = Some(display_name.clone());
        }
        Ok(identity.clone())
    }
}

/// Memory store whose `get` and `subscribe` calls wait until [`release`]
/// is called. Writes go straight through.
///
/// [`release`]: GatedDocumentStore::release
#[derive(Debug)]
pub(crate) struct GatedDocumentStore {
    inner: MemoryDocumentStore,
    gate: Semaphore,
    entered: Notify,
}

impl GatedDocumentStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    pub(crate) const fn inner(&self) -> &MemoryDocumentStore {
        &self.inner
    }

    /// Resolves once some read is parked at the gate.
    pub(crate) async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let every parked and future read through.
    pub(crate) fn release(&self) {
        self.gate.close();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        // The semaphore never holds permits; acquiring only returns once closed.
        let _ = self.gate.acquire().await;
    }
}

impl DocumentStore for GatedDocumentStore {
    async fn get(&self, path: &DocumentPath) -> RemoteResult<Option<RemoteDocument>> {
        self.pass().await;
        self.inner.get(path).await
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Map<String, Value>) -> RemoteResult<()> {
        self.inner.set_merge(path, fields).await
    }

    async fn update_array(
        &self,
        path: &DocumentPath,
        field: &str,
        ops: &[ArrayOp],
    ) -> RemoteResult<()> {
        self.inner.update_array(path, field, ops).await
    }

    async fn subscribe(&self, path: &DocumentPath) -> RemoteResult<SnapshotStream> {
        self.pass().await;
        self.inner.subscribe(path).await
    }
}
