//! Hosted backend-as-a-service access.
//!
//! The back-office owns no database. Identities live in the provider's auth
//! service and profiles in its relational API; this module is the only place
//! that talks to either.
//!
//! # Shape
//!
//! - [`Backend`] is the process-wide handle (endpoint, public key, HTTP pool).
//!   Each visitor gets its own [`RemoteClient`] from [`Backend::connect`], the
//!   equivalent of one browser tab's SDK instance holding its own tokens.
//! - [`AuthProvider`] covers the session half of a client and
//!   [`RecordStore`] the table half.
//! - [`SupabaseBackend`] speaks the real REST endpoints; [`InMemoryBackend`]
//!   is a test double with the same observable behaviour.

pub mod memory;
pub mod supabase;

use std::future::Future;

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use campaign_core::{Email, ProfileId};

pub use memory::{InMemoryBackend, InMemoryClient};
pub use supabase::{SupabaseBackend, SupabaseClient};

/// Capacity of each client's auth event channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Errors returned by the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The provider rejected the email/password pair.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The account exists but its email was never confirmed.
    #[error("email not confirmed")]
    EmailNotConfirmed,

    /// Transport failure (connect, timeout, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error status.
    #[error("backend returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },

    /// The backend answered with a body we could not interpret.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// An endpoint URL could not be built.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// The provider-side account behind a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Unique id, shared with the profile row.
    pub id: ProfileId,
    /// Login email, when the provider returns one.
    pub email: Option<String>,
}

/// Session transitions published by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A password sign-in established a session.
    SignedIn,
    /// The session ended (explicit sign-out or failed refresh).
    SignedOut,
    /// The access token was replaced using the refresh token.
    TokenRefreshed,
}

/// Session operations of a remote client.
pub trait AuthProvider: Send + Sync + 'static {
    /// The currently valid session, if any.
    ///
    /// Implementations refresh an expired access token before answering.
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Identity>, BackendError>> + Send;

    /// Receive every subsequent session transition.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Exchange an email/password pair for a session.
    ///
    /// `Ok(None)` means the provider accepted the credentials but returned no
    /// account identifier.
    fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> impl Future<Output = Result<Option<Identity>, BackendError>> + Send;

    /// Invalidate the session. The local session is dropped even when the
    /// remote call fails.
    fn sign_out(&self) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Relational access of a remote client.
pub trait RecordStore: Send + Sync + 'static {
    /// Look up at most one row of `table` by its `id` primary key.
    fn query_by_primary_key<T>(
        &self,
        table: &str,
        columns: &str,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<T>, BackendError>> + Send
    where
        T: DeserializeOwned + Send + 'static;
}

/// One visitor's connection to the backend.
pub trait RemoteClient: AuthProvider + RecordStore {}

impl<T: AuthProvider + RecordStore> RemoteClient for T {}

/// Process-wide backend handle.
pub trait Backend: Clone + Send + Sync + 'static {
    /// Client type handed to each visitor.
    type Client: RemoteClient;

    /// Create a fresh, signed-out client.
    fn connect(&self) -> Self::Client;

    /// Probe the backend for readiness checks.
    fn health(&self) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Handle returned by [`on_session_change`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop receiving events.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether the listener task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `callback` for every session transition of `provider`.
///
/// Events are handled one at a time, in the order they were published.
/// Must be called from within a Tokio runtime.
pub fn on_session_change<A, F, Fut>(provider: &A, callback: F) -> Subscription
where
    A: AuthProvider,
    F: Fn(AuthEvent) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut events = provider.subscribe();
    let task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => callback(event).await,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Auth event listener lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    Subscription { task }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_on_session_change_delivers_events_until_dropped() {
        let backend = InMemoryBackend::new();
        let client = backend.connect();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let subscription = on_session_change(&client, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        client.sign_out().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        subscription.unsubscribe();
        client.sign_out().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Api {
            status: 403,
            message: "permission denied for table users".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "backend returned 403: permission denied for table users"
        );
    }
}
