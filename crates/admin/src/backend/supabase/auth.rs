//! Auth endpoint calls (`/auth/v1`).
//!
//! Handles password and refresh-token grants and logout. Tokens never leave
//! this module unwrapped except as request headers.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use campaign_core::{Email, ProfileId};

use super::Endpoints;
use crate::backend::{BackendError, Identity};

/// Seconds of clock skew tolerated before an access token counts as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Tokens held by a signed-in client.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    /// Account behind the session, when the provider returned one.
    pub user: Option<Identity>,
    /// Bearer token for API requests.
    pub access_token: SecretString,
    /// Token used to obtain a new access token.
    pub refresh_token: SecretString,
    /// Unix timestamp when the access token expires.
    pub expires_at: i64,
}

impl RemoteSession {
    /// Check if the access token has expired (with a 60 second margin).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at - EXPIRY_MARGIN_SECS
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

/// Successful token response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Token lifetime in seconds.
    expires_in: i64,
    /// Absolute expiry, sent by newer servers.
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<UserResponse>,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    email: Option<String>,
}

/// Error body. Older servers use `error`/`error_description`, newer ones
/// `error_code`/`msg`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct AuthErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AuthErrorResponse {
    fn text(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Turn an error status and body into a [`BackendError`].
pub(super) fn classify_error(status: u16, body: &AuthErrorResponse) -> BackendError {
    let code = body
        .error_code
        .as_deref()
        .or(body.error.as_deref())
        .unwrap_or_default();
    let text = body.text();

    if code == "email_not_confirmed" || text.contains("Email not confirmed") {
        BackendError::EmailNotConfirmed
    } else if matches!(status, 400 | 401)
        && (code == "invalid_credentials"
            || code == "invalid_grant"
            || text.contains("Invalid login credentials"))
    {
        BackendError::InvalidCredentials(text)
    } else {
        BackendError::Api {
            status,
            message: text,
        }
    }
}

impl TokenResponse {
    fn into_session(self, now: i64) -> RemoteSession {
        let user = self.user.and_then(|user| {
            user.id.map(|id| Identity {
                id: ProfileId::new(id),
                email: user.email,
            })
        });
        RemoteSession {
            user,
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at: self.expires_at.unwrap_or(now + self.expires_in),
        }
    }
}

async fn token_request<B: Serialize + Sync>(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    anon_key: &SecretString,
    grant_type: &str,
    body: &B,
) -> Result<RemoteSession, BackendError> {
    let now = chrono::Utc::now().timestamp();

    let response = http
        .post(endpoints.token.clone())
        .query(&[("grant_type", grant_type)])
        .header("apikey", anon_key.expose_secret())
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(token.into_session(now))
    } else {
        let body: AuthErrorResponse = response.json().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body))
    }
}

/// Sign in with email and password.
///
/// # Errors
///
/// Returns `BackendError::InvalidCredentials` if the pair is rejected and
/// `BackendError::EmailNotConfirmed` if the account is unconfirmed.
#[instrument(skip(http, endpoints, anon_key, password), fields(email = %email))]
pub async fn password_grant(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    anon_key: &SecretString,
    email: &Email,
    password: &SecretString,
) -> Result<RemoteSession, BackendError> {
    token_request(
        http,
        endpoints,
        anon_key,
        "password",
        &PasswordGrant {
            email: email.as_str(),
            password: password.expose_secret(),
        },
    )
    .await
}

/// Obtain a new access token with a refresh token.
///
/// # Errors
///
/// Returns a `BackendError` if the refresh token was revoked or expired.
#[instrument(skip_all)]
pub async fn refresh_grant(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    anon_key: &SecretString,
    refresh_token: &SecretString,
) -> Result<RemoteSession, BackendError> {
    token_request(
        http,
        endpoints,
        anon_key,
        "refresh_token",
        &RefreshGrant {
            refresh_token: refresh_token.expose_secret(),
        },
    )
    .await
}

/// Revoke the session server-side.
///
/// # Errors
///
/// Returns a `BackendError` on transport failure or an unexpected status.
/// A 401/404 (token already gone) counts as success.
#[instrument(skip_all)]
pub async fn logout(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    anon_key: &SecretString,
    access_token: &SecretString,
) -> Result<(), BackendError> {
    let response = http
        .post(endpoints.logout.clone())
        .header("apikey", anon_key.expose_secret())
        .bearer_auth(access_token.expose_secret())
        .send()
        .await?;

    let status = response.status();
    if status.is_success()
        || status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::NOT_FOUND
    {
        Ok(())
    } else {
        let body: AuthErrorResponse = response.json().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body))
    }
}
