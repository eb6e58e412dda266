//! Sign-in failures.

use thiserror::Error;

use campaign_core::Role;

use crate::backend::BackendError;

/// Why a sign-in attempt did not produce an administrative session.
#[derive(Debug, Error)]
pub enum SignInError {
    /// The provider rejected the email/password pair.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// The account exists but its email was never confirmed.
    #[error("email not confirmed")]
    EmailNotConfirmed,

    /// The provider accepted the credentials but returned no user id.
    #[error("no auth user id returned")]
    MissingIdentifier,

    /// The identity has no `users` row.
    #[error("user profile not found")]
    ProfileNotFound,

    /// The profile exists but its role may not use the back-office.
    #[error("access denied for role {role}")]
    AccessDenied {
        /// Role found on the profile.
        role: Role,
    },

    /// Transport or unexpected backend failure.
    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for SignInError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidCredentials(_) => Self::InvalidCredentials,
            BackendError::EmailNotConfirmed => Self::EmailNotConfirmed,
            other => Self::Backend(other),
        }
    }
}

impl SignInError {
    /// Text shown on the login form.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Email ou mot de passe incorrect. Vérifiez que le compte \
                                         existe et que son adresse email est confirmée."
                .to_string(),
            Self::EmailNotConfirmed => "Adresse email non confirmée. Confirmez-la depuis le lien \
                                       reçu, ou activez la confirmation automatique dans le \
                                       fournisseur d'authentification."
                .to_string(),
            Self::MissingIdentifier => {
                "La connexion n'a renvoyé aucun identifiant utilisateur. Réessayez.".to_string()
            }
            Self::ProfileNotFound => "Profil utilisateur introuvable. Un administrateur doit créer \
                                     la ligne correspondante dans la table users."
                .to_string(),
            Self::AccessDenied { role } => {
                format!("Accès refusé : vous n'êtes pas administrateur (rôle : {role}).")
            }
            Self::Backend(_) => "Service d'authentification indisponible. Réessayez dans quelques \
                                 instants."
                .to_string(),
        }
    }

    /// Whether the visitor can fix the problem by retyping the form.
    #[must_use]
    pub const fn is_credential_error(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::EmailNotConfirmed)
    }
}
