//! CLI identity provider with keychain session persistence.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use toolbox_core::auth::{
    AuthError, AuthResult, AuthSession, IdentityProvider, SessionPersistence, SupabaseAuthClient,
    SupabaseIdentityProvider,
};
use toolbox_core::config::ToolboxConfig;
use toolbox_core::models::{Identity, ProfileUpdate};

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "toolbox-cli";

#[derive(Clone)]
pub struct KeyringSessionStore {
    username: String,
}

impl KeyringSessionStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            username: format!("supabase_session:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }
}

impl SessionPersistence for KeyringSessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        match guard.get(&self.username) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    #[cfg(not(test))]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&raw)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> AuthResult<()> {
        let entry = self.entry()?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Identity provider for the CLI: Supabase when configured, otherwise a
/// local-only mode where every account operation reports missing config.
pub enum CliIdentity {
    Supabase(SupabaseIdentityProvider<KeyringSessionStore>),
    LocalOnly,
}

impl CliIdentity {
    pub fn from_config(config: &ToolboxConfig, profile_name: &str) -> Result<Self, CliError> {
        let Some((url, anon_key)) = config.supabase()? else {
            tracing::debug!("Supabase is not configured; running local-only");
            return Ok(Self::LocalOnly);
        };
        let client =
            SupabaseAuthClient::new(url, anon_key, KeyringSessionStore::new(profile_name))?;
        Ok(Self::Supabase(SupabaseIdentityProvider::new(client)))
    }

    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Supabase(_))
    }
}

impl IdentityProvider for CliIdentity {
    async fn restore(&self) -> AuthResult<Option<Identity>> {
        match self {
            Self::Supabase(provider) => provider.restore().await,
            Self::LocalOnly => Ok(None),
        }
    }

    async fn create_account(&self, email: &str, password: &str) -> AuthResult<Identity> {
        match self {
            Self::Supabase(provider) => provider.create_account(email, password).await,
            Self::LocalOnly => Err(AuthError::NotConfigured),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        match self {
            Self::Supabase(provider) => provider.sign_in(email, password).await,
            Self::LocalOnly => Err(AuthError::NotConfigured),
        }
    }

    async fn sign_out(&self) -> AuthResult<()> {
        match self {
            Self::Supabase(provider) => provider.sign_out().await,
            Self::LocalOnly => Ok(()),
        }
    }

    async fn send_reset_link(&self, email: &str) -> AuthResult<()> {
        match self {
            Self::Supabase(provider) => provider.send_reset_link(email).await,
            Self::LocalOnly => Err(AuthError::NotConfigured),
        }
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> AuthResult<Identity> {
        match self {
            Self::Supabase(provider) => provider.update_profile(update).await,
            Self::LocalOnly => Err(AuthError::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use toolbox_core::auth::AuthUser;

    fn session(user_id: &str) -> AuthSession {
        AuthSession {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: i64::MAX / 2,
            user: AuthUser {
                id: user_id.to_string(),
                email: Some("ada@example.com".to_string()),
                display_name: None,
            },
        }
    }

    #[test]
    fn profiles_keep_separate_sessions() {
        let work = KeyringSessionStore::new("test-work");
        let home = KeyringSessionStore::new("test-home");
        work.save_session(&session("work-user")).unwrap();

        assert_eq!(
            work.load_session().unwrap().map(|s| s.user.id),
            Some("work-user".to_string())
        );
        assert!(home.load_session().unwrap().is_none());

        work.clear_session().unwrap();
        assert!(work.load_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn local_only_mode_rejects_account_operations() {
        let identity = CliIdentity::from_config(&ToolboxConfig::default(), "test-local").unwrap();
        assert!(!identity.is_configured());
        assert!(identity.restore().await.unwrap().is_none());
        assert!(matches!(
            identity.sign_in("ada@example.com", "secret").await,
            Err(AuthError::NotConfigured)
        ));
        assert!(identity.sign_out().await.is_ok());
    }

    #[tokio::test]
    async fn configured_mode_restores_stored_session() {
        let config = ToolboxConfig {
            supabase_url: Some("https://demo.supabase.co".to_string()),
            supabase_anon_key: Some("anon".to_string()),
            ..ToolboxConfig::default()
        };
        KeyringSessionStore::new("test-restore")
            .save_session(&session("restored-user"))
            .unwrap();

        let identity = CliIdentity::from_config(&config, "test-restore").unwrap();
        assert!(identity.is_configured());
        let restored = identity.restore().await.unwrap().unwrap();
        assert_eq!(restored.id, "restored-user");
    }
}
