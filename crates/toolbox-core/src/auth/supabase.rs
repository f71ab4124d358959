//! Supabase auth client and the identity provider built on it.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AuthError, AuthFailureKind, AuthResult, IdentityProvider};
use crate::models::{Identity, ProfileUpdate};
use crate::util::{normalize_text_option, unix_timestamp_now};

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl From<AuthUser> for Identity {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    ConfirmationRequired,
}

/// Where the signed-in session is kept between runs.
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

#[derive(Clone)]
pub struct SupabaseAuthClient<S: SessionPersistence> {
    auth_url: String,
    anon_key: String,
    client: Client,
    store: S,
}

impl<S: SessionPersistence> SupabaseAuthClient<S> {
    pub fn new(url: impl AsRef<str>, anon_key: impl Into<String>, store: S) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }

        Ok(Self {
            auth_url,
            anon_key,
            client: Client::builder().build()?,
            store,
        })
    }

    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/signup", self.auth_url))
                .json(&payload),
        );
        let response = self.send_auth_request(request).await?;
        match response.into_session()? {
            Some(session) => {
                self.store.save_session(&session)?;
                Ok(SignUpOutcome::SignedIn(session))
            }
            None => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "password")])
                .json(&payload),
        );

        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Sign-in response did not include an active session".to_string())
        })?;

        self.store.save_session(&session)?;
        Ok(session)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = serde_json::json!({
            "refresh_token": refresh_token,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );
        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Refresh response did not include an active session".to_string())
        })?;

        self.store.save_session(&session)?;
        Ok(session)
    }

    /// Forget the stored session, then revoke it server-side. The stored
    /// session is gone even when the revoke fails.
    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        self.store.clear_session()?;

        let request = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);

        let response = request.send().await?;
        if !(response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED) {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        Ok(())
    }

    /// Ask the server to email a password reset link.
    pub async fn recover(&self, email: &str) -> AuthResult<()> {
        if email.trim().is_empty() {
            return Err(AuthError::rejected(
                AuthFailureKind::InvalidHandle,
                "Email is required",
            ));
        }

        let payload = serde_json::json!({ "email": email.trim() });
        let request = self.public_request(
            self.client
                .post(format!("{}/recover", self.auth_url))
                .json(&payload),
        );
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        Ok(())
    }

    /// Update the signed-in user's metadata and persist the refreshed session.
    pub async fn update_user(
        &self,
        session: &AuthSession,
        update: &ProfileUpdate,
    ) -> AuthResult<AuthSession> {
        let mut data = Map::new();
        if let Some(display_name) = &update.display_name {
            data.insert(
                "display_name".to_string(),
                Value::String(display_name.trim().to_string()),
            );
        }
        if let Some(photo_url) = &update.photo_url {
            data.insert(
                "avatar_url".to_string(),
                Value::String(photo_url.trim().to_string()),
            );
        }

        let request = self
            .client
            .put(format!("{}/user", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .json(&serde_json::json!({ "data": data }));
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let user = response.json::<SupabaseUser>().await?;
        let updated = AuthSession {
            user: user.into(),
            ..session.clone()
        };
        self.store.save_session(&updated)?;
        Ok(updated)
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn send_auth_request(&self, request: RequestBuilder) -> AuthResult<SupabaseAuthResponse> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        Ok(response.json::<SupabaseAuthResponse>().await?)
    }
}

/// [`IdentityProvider`] backed by Supabase auth.
pub struct SupabaseIdentityProvider<S: SessionPersistence> {
    client: SupabaseAuthClient<S>,
    session: Mutex<Option<AuthSession>>,
}

impl<S: SessionPersistence> SupabaseIdentityProvider<S> {
    pub fn new(client: SupabaseAuthClient<S>) -> Self {
        Self {
            client,
            session: Mutex::new(None),
        }
    }

    pub const fn client(&self) -> &SupabaseAuthClient<S> {
        &self.client
    }

    fn current(&self) -> Option<AuthSession> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, session: Option<AuthSession>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    async fn active_session(&self) -> AuthResult<AuthSession> {
        let session = self.current().ok_or(AuthError::NotSignedIn)?;
        if !session.is_expired() {
            return Ok(session);
        }
        let refreshed = self.client.refresh_session(&session.refresh_token).await?;
        self.remember(Some(refreshed.clone()));
        Ok(refreshed)
    }
}

impl<S: SessionPersistence> IdentityProvider for SupabaseIdentityProvider<S> {
    async fn restore(&self) -> AuthResult<Option<Identity>> {
        let session = self.client.restore_session().await?;
        let identity = session.as_ref().map(|session| session.user.clone().into());
        self.remember(session);
        Ok(identity)
    }

    async fn create_account(&self, email: &str, password: &str) -> AuthResult<Identity> {
        match self.client.sign_up(email, password).await? {
            SignUpOutcome::SignedIn(session) => {
                let identity = session.user.clone().into();
                self.remember(Some(session));
                Ok(identity)
            }
            SignUpOutcome::ConfirmationRequired => Err(AuthError::rejected(
                AuthFailureKind::ConfirmationRequired,
                "Account created; email confirmation required",
            )),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let session = self.client.sign_in(email, password).await?;
        let identity = session.user.clone().into();
        self.remember(Some(session));
        Ok(identity)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let Some(session) = self.current() else {
            return self.client.store.clear_session();
        };
        self.remember(None);
        self.client.sign_out(&session.access_token).await
    }

    async fn send_reset_link(&self, email: &str) -> AuthResult<()> {
        self.client.recover(email).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> AuthResult<Identity> {
        let session = self.active_session().await?;
        if update.is_empty() {
            return Ok(session.user.into());
        }
        let updated = self.client.update_user(&session, update).await?;
        let identity = updated.user.clone().into();
        self.remember(Some(updated));
        Ok(identity)
    }
}

pub fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must not be empty",
        ));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/auth/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/auth/v1"))
    }
}

pub fn resolve_optional_supabase_config(
    url: Option<String>,
    anon_key: Option<String>,
) -> AuthResult<Option<(String, String)>> {
    let url = normalize_text_option(url);
    let anon_key = normalize_text_option(anon_key);

    match (url, anon_key) {
        (None, None) => Ok(None),
        (Some(url), Some(anon_key)) => Ok(Some((url, anon_key))),
        _ => Err(AuthError::NotConfigured),
    }
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::rejected(
            AuthFailureKind::InvalidHandle,
            "A valid email is required",
        ));
    }
    if password.trim().is_empty() {
        return Err(AuthError::rejected(
            AuthFailureKind::BadCredentials,
            "Password is required",
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
    session: Option<SupabaseAuthResponseSession>,
}

impl SupabaseAuthResponse {
    fn into_session(self) -> AuthResult<Option<AuthSession>> {
        let nested_session = self.session;
        let access_token = self.access_token.or_else(|| {
            nested_session
                .as_ref()
                .and_then(|session| session.access_token.clone())
        });
        let refresh_token = self.refresh_token.or_else(|| {
            nested_session
                .as_ref()
                .and_then(|session| session.refresh_token.clone())
        });
        let expires_at = self
            .expires_at
            .or_else(|| {
                nested_session
                    .as_ref()
                    .and_then(|session| session.expires_at)
            })
            .or_else(|| {
                self.expires_in
                    .or_else(|| {
                        nested_session
                            .as_ref()
                            .and_then(|session| session.expires_in)
                    })
                    .map(|expires_in| unix_timestamp_now().saturating_add(expires_in))
            });
        let user = self
            .user
            .or_else(|| nested_session.and_then(|session| session.user))
            .map(Into::into);

        match (access_token, refresh_token, expires_at, user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(Some(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user,
                }))
            }
            (None, None, None, Some(_)) => Ok(None),
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponseSession {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Map<String, Value>,
}

impl From<SupabaseUser> for AuthUser {
    fn from(value: SupabaseUser) -> Self {
        let display_name = ["display_name", "full_name", "name"]
            .iter()
            .find_map(|key| value.user_metadata.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        Self {
            id: value.id,
            email: value.email,
            display_name: normalize_text_option(display_name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    code: Option<Value>,
    message: Option<String>,
    msg: Option<String>,
}

fn api_error(status: StatusCode, body: &str) -> AuthError {
    let payload = serde_json::from_str::<SupabaseErrorResponse>(body).ok();
    let message = describe_api_error(status, body, payload.as_ref());

    let code = payload.as_ref().and_then(|payload| {
        payload
            .error_code
            .clone()
            .or_else(|| payload.code.as_ref().and_then(Value::as_str).map(str::to_string))
            .or_else(|| payload.error.clone())
    });
    let kind = code
        .as_deref()
        .and_then(AuthFailureKind::from_code)
        .or_else(|| (status == StatusCode::TOO_MANY_REQUESTS).then_some(AuthFailureKind::RateLimited));

    match kind {
        Some(kind) => AuthError::Rejected { kind, message },
        None => AuthError::Api(message),
    }
}

fn describe_api_error(
    status: StatusCode,
    body: &str,
    payload: Option<&SupabaseErrorResponse>,
) -> String {
    if let Some(message) = payload.and_then(|payload| {
        payload
            .message
            .clone()
            .or_else(|| payload.msg.clone())
            .or_else(|| payload.error_description.clone())
            .or_else(|| payload.error.clone())
    }) {
        return format!("{} ({})", message.trim(), status.as_u16());
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
