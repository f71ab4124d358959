//! User-facing auth messages.

use super::{AuthAction, AuthFailureKind};

/// Language used for messages shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    French,
    English,
}

impl Locale {
    /// Pick a locale from a preferences language code such as `fr` or `en-US`.
    /// Anything that is not English falls back to French.
    pub fn from_language(language: &str) -> Self {
        let primary = language
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if primary == "en" {
            Self::English
        } else {
            Self::French
        }
    }

    /// Placeholder display name for an identity without name or email.
    pub const fn anonymous_user(self) -> &'static str {
        match self {
            Self::French => "Utilisateur",
            Self::English => "User",
        }
    }
}

pub(super) const fn message(locale: Locale, action: AuthAction, kind: AuthFailureKind) -> &'static str {
    use AuthAction as A;
    use AuthFailureKind as K;

    match (locale, action, kind) {
        (Locale::French, _, K::DuplicateAccount) => "Cette adresse email est déjà utilisée",
        (Locale::English, _, K::DuplicateAccount) => "This email address is already in use",
        (Locale::French, _, K::InvalidHandle) => "Adresse email invalide",
        (Locale::English, _, K::InvalidHandle) => "Invalid email address",
        (Locale::French, _, K::WeakSecret) => "Mot de passe trop faible",
        (Locale::English, _, K::WeakSecret) => "Password is too weak",
        (Locale::French, A::ResetPassword, K::AccountNotFound) => {
            "Aucun compte associé à cette adresse email"
        }
        (Locale::English, A::ResetPassword, K::AccountNotFound) => {
            "No account is associated with this email address"
        }
        (Locale::French, _, K::BadCredentials | K::AccountNotFound) => "Identifiants incorrects",
        (Locale::English, _, K::BadCredentials | K::AccountNotFound) => "Incorrect credentials",
        (Locale::French, _, K::RateLimited) => {
            "Trop de tentatives échouées. Veuillez réessayer plus tard."
        }
        (Locale::English, _, K::RateLimited) => "Too many failed attempts. Please try again later.",
        (Locale::French, _, K::ConfirmationRequired) => {
            "Vérifiez vos emails pour confirmer votre compte"
        }
        (Locale::English, _, K::ConfirmationRequired) => "Check your inbox to confirm your account",
        (Locale::French, _, K::Network) => "Erreur réseau. Vérifiez votre connexion.",
        (Locale::English, _, K::Network) => "Network error. Check your connection.",
        (Locale::French, A::Register, K::Other) => "Erreur lors de l'inscription",
        (Locale::English, A::Register, K::Other) => "Sign-up failed",
        (Locale::French, A::Login, K::Other) => "Erreur lors de la connexion",
        (Locale::English, A::Login, K::Other) => "Sign-in failed",
        (Locale::French, A::Logout, K::Other) => "Erreur lors de la déconnexion",
        (Locale::English, A::Logout, K::Other) => "Sign-out failed",
        (Locale::French, A::ResetPassword, K::Other) => {
            "Erreur lors de la réinitialisation du mot de passe"
        }
        (Locale::English, A::ResetPassword, K::Other) => "Password reset failed",
        (Locale::French, A::UpdateProfile, K::Other) => "Erreur lors de la mise à jour du profil",
        (Locale::English, A::UpdateProfile, K::Other) => "Profile update failed",
    }
}
