//! Identity provider abstraction and auth error handling.

mod messages;
mod supabase;

use thiserror::Error;

use crate::models::{Identity, ProfileUpdate};

pub use messages::Locale;
pub use supabase::{
    normalize_auth_url, resolve_optional_supabase_config, AuthSession, AuthUser,
    SessionPersistence, SignUpOutcome, SupabaseAuthClient, SupabaseIdentityProvider,
};

/// Failure categories surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailureKind {
    DuplicateAccount,
    InvalidHandle,
    WeakSecret,
    BadCredentials,
    AccountNotFound,
    RateLimited,
    ConfirmationRequired,
    Network,
    Other,
}

impl AuthFailureKind {
    /// Map a provider error code (e.g. `user_already_exists`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "user_already_exists" | "email_exists" => Some(Self::DuplicateAccount),
            "email_address_invalid" | "validation_failed" => Some(Self::InvalidHandle),
            "weak_password" => Some(Self::WeakSecret),
            "invalid_credentials" | "invalid_grant" => Some(Self::BadCredentials),
            "user_not_found" => Some(Self::AccountNotFound),
            "over_request_rate_limit" | "over_email_send_rate_limit" | "too_many_requests" => {
                Some(Self::RateLimited)
            }
            "email_not_confirmed" => Some(Self::ConfirmationRequired),
            _ => None,
        }
    }
}

/// User-triggered auth operations, used to pick a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Register,
    Login,
    Logout,
    ResetPassword,
    UpdateProfile,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Supabase auth is not configured for this build.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth request rejected: {message}")]
    Rejected {
        kind: AuthFailureKind,
        message: String,
    },
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("No signed-in session")]
    NotSignedIn,
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

impl AuthError {
    pub(crate) fn rejected(kind: AuthFailureKind, message: impl Into<String>) -> Self {
        Self::Rejected {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> AuthFailureKind {
        match self {
            Self::Rejected { kind, .. } => *kind,
            Self::Http(error) if error.is_connect() || error.is_timeout() => {
                AuthFailureKind::Network
            }
            _ => AuthFailureKind::Other,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Auth failure as shown to the user: categorized and localized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthFailure {
    pub action: AuthAction,
    pub kind: AuthFailureKind,
    pub message: String,
}

impl AuthFailure {
    pub fn new(action: AuthAction, kind: AuthFailureKind, locale: Locale) -> Self {
        Self {
            action,
            kind,
            message: messages::message(locale, action, kind).to_string(),
        }
    }

    pub fn from_error(action: AuthAction, error: &AuthError, locale: Locale) -> Self {
        Self::new(action, error.kind(), locale)
    }
}

/// Account backend used by the session manager.
#[allow(async_fn_in_trait)]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Identity from a persisted session, if one is still valid.
    async fn restore(&self) -> AuthResult<Option<Identity>>;

    async fn create_account(&self, email: &str, password: &str) -> AuthResult<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity>;

    async fn sign_out(&self) -> AuthResult<()>;

    async fn send_reset_link(&self, email: &str) -> AuthResult<()>;

    /// Apply profile changes to the signed-in identity.
    async fn update_profile(&self, update: &ProfileUpdate) -> AuthResult<Identity>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn provider_codes_are_classified() {
        assert_eq!(
            AuthFailureKind::from_code("user_already_exists"),
            Some(AuthFailureKind::DuplicateAccount)
        );
        assert_eq!(
            AuthFailureKind::from_code("over_request_rate_limit"),
            Some(AuthFailureKind::RateLimited)
        );
        assert_eq!(AuthFailureKind::from_code("unexpected_failure"), None);
    }

    #[test]
    fn failures_localize_from_errors() {
        let error = AuthError::rejected(AuthFailureKind::DuplicateAccount, "exists");
        let failure = AuthFailure::from_error(AuthAction::Register, &error, Locale::French);
        assert_eq!(failure.message, "Cette adresse email est déjà utilisée");

        let failure =
            AuthFailure::from_error(AuthAction::Login, &AuthError::NotConfigured, Locale::English);
        assert_eq!(failure.kind, AuthFailureKind::Other);
        assert_eq!(failure.to_string(), "Sign-in failed");
    }
}
