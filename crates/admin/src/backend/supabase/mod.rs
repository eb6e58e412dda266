//! Supabase REST client.
//!
//! Talks to the auth service (`/auth/v1`) for sessions and to the relational
//! API (`/rest/v1`) for profile lookups. Only the public anon key is ever
//! used here; privileged keys belong to the `cm-cli` provisioning tool.

mod auth;
mod rest;

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, broadcast};
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use campaign_core::Email;

pub use auth::RemoteSession;

use super::{
    AuthEvent, AuthProvider, Backend, BackendError, EVENT_CHANNEL_CAPACITY, Identity, RecordStore,
};

/// Request timeout for every backend call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved endpoint URLs.
#[derive(Debug)]
pub struct Endpoints {
    token: Url,
    logout: Url,
    health: Url,
    /// Base for table URLs, with a trailing slash.
    rest: Url,
}

impl Endpoints {
    fn new(base: &Url) -> Result<Self, url::ParseError> {
        // Without a trailing slash `join` would replace the last path segment.
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            token: base.join("auth/v1/token")?,
            logout: base.join("auth/v1/logout")?,
            health: base.join("auth/v1/health")?,
            rest: base.join("rest/v1/")?,
        })
    }
}

/// Process-wide Supabase handle.
///
/// Cheap to clone; all visitors share the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct SupabaseBackend {
    inner: Arc<SupabaseInner>,
}

#[derive(Debug)]
struct SupabaseInner {
    http: reqwest::Client,
    endpoints: Endpoints,
    anon_key: SecretString,
}

impl SupabaseBackend {
    /// Create a backend for the project at `url`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InvalidUrl` if endpoint URLs cannot be derived
    /// from `url`, or `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(url: &Url, anon_key: SecretString) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(SupabaseInner {
                http,
                endpoints: Endpoints::new(url)?,
                anon_key,
            }),
        })
    }
}

impl Backend for SupabaseBackend {
    type Client = SupabaseClient;

    fn connect(&self) -> Self::Client {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        SupabaseClient {
            backend: self.clone(),
            session: RwLock::new(None),
            events,
        }
    }

    #[instrument(skip(self))]
    async fn health(&self) -> Result<(), BackendError> {
        let inner = &self.inner;
        let response = inner
            .http
            .get(inner.endpoints.health.clone())
            .header("apikey", inner.anon_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::Api {
                status: status.as_u16(),
                message: "auth service health check failed".to_string(),
            })
        }
    }
}

/// One visitor's Supabase client, holding that visitor's tokens.
#[derive(Debug)]
pub struct SupabaseClient {
    backend: SupabaseBackend,
    session: RwLock<Option<RemoteSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    fn publish(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    /// Refresh an expired session in place.
    async fn refresh(&self, expired: RemoteSession) -> Result<Option<Identity>, BackendError> {
        let inner = &self.backend.inner;
        match auth::refresh_grant(
            &inner.http,
            &inner.endpoints,
            &inner.anon_key,
            &expired.refresh_token,
        )
        .await
        {
            Ok(mut refreshed) => {
                if refreshed.user.is_none() {
                    refreshed.user = expired.user;
                }
                let user = refreshed.user.clone();
                *self.session.write().await = Some(refreshed);
                self.publish(AuthEvent::TokenRefreshed);
                Ok(user)
            }
            Err(e @ BackendError::Http(_)) => Err(e),
            Err(e) => {
                tracing::info!(error = %e, "Refresh token rejected, dropping session");
                *self.session.write().await = None;
                self.publish(AuthEvent::SignedOut);
                Ok(None)
            }
        }
    }
}

impl AuthProvider for SupabaseClient {
    async fn current_session(&self) -> Result<Option<Identity>, BackendError> {
        let Some(session) = self.session.read().await.clone() else {
            return Ok(None);
        };
        if session.is_expired() {
            self.refresh(session).await
        } else {
            Ok(session.user)
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Option<Identity>, BackendError> {
        let inner = &self.backend.inner;
        let session =
            auth::password_grant(&inner.http, &inner.endpoints, &inner.anon_key, email, password)
                .await?;

        let user = session.user.clone();
        *self.session.write().await = Some(session);
        self.publish(AuthEvent::SignedIn);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.session.write().await.take();
        self.publish(AuthEvent::SignedOut);

        let Some(previous) = previous else {
            return Ok(());
        };
        let inner = &self.backend.inner;
        auth::logout(
            &inner.http,
            &inner.endpoints,
            &inner.anon_key,
            &previous.access_token,
        )
        .await
    }
}

impl RecordStore for SupabaseClient {
    async fn query_by_primary_key<T>(
        &self,
        table: &str,
        columns: &str,
        id: Uuid,
    ) -> Result<Option<T>, BackendError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let access_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|session| session.access_token.clone());

        let inner = &self.backend.inner;
        rest::select_by_id(
            &inner.http,
            &inner.endpoints,
            &inner.anon_key,
            access_token.as_ref(),
            table,
            columns,
            id,
        )
        .await
    }
}
