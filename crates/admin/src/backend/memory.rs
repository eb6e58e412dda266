//! In-memory backend used by tests and local demos.
//!
//! Accounts and table rows live in a shared directory; each connected client
//! keeps its own session slot and event channel, exactly like separate SDK
//! instances against the same project.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use campaign_core::{Email, Profile, ProfileId};

use super::{
    AuthEvent, AuthProvider, Backend, BackendError, EVENT_CHANNEL_CAPACITY, Identity, RecordStore,
};

/// A provisioned account.
#[derive(Debug, Clone)]
struct Account {
    id: ProfileId,
    password: String,
    confirmed: bool,
}

#[derive(Debug, Default)]
struct Directory {
    /// Accounts keyed by login email.
    accounts: HashMap<String, Account>,
    /// Rows per table.
    tables: HashMap<String, Vec<Value>>,
    /// When set, table queries fail with this message.
    query_failure: Option<String>,
    /// Delay applied before answering table queries.
    query_delay: Option<Duration>,
    /// Simulate a provider that accepts credentials but omits the user.
    omit_identifier: bool,
    /// Count of remote sign-out calls, across all clients.
    sign_outs: usize,
}

/// Shared in-memory "project".
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    directory: Arc<Mutex<Directory>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn directory(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Provision a confirmed account and return its identity id.
    pub fn add_account(&self, email: &str, password: &str) -> ProfileId {
        self.insert_account(email, password, true)
    }

    /// Provision an account whose email is not confirmed yet.
    pub fn add_unconfirmed_account(&self, email: &str, password: &str) -> ProfileId {
        self.insert_account(email, password, false)
    }

    fn insert_account(&self, email: &str, password: &str, confirmed: bool) -> ProfileId {
        let id = ProfileId::random();
        self.directory().accounts.insert(
            email.to_owned(),
            Account {
                id,
                password: password.to_owned(),
                confirmed,
            },
        );
        id
    }

    /// Insert a raw row into `table`.
    pub fn insert_row(&self, table: &str, row: Value) {
        self.directory()
            .tables
            .entry(table.to_owned())
            .or_default()
            .push(row);
    }

    /// Insert a profile into the `users` table.
    pub fn insert_profile(&self, profile: &Profile) {
        self.insert_row(
            Profile::TABLE,
            serde_json::json!({
                "id": profile.id,
                "email": profile.email,
                "name": profile.name,
                "role": profile.role,
                "created_at": chrono::Utc::now(),
                "updated_at": chrono::Utc::now(),
            }),
        );
    }

    /// Make every subsequent table query fail (`None` restores normal behaviour).
    pub fn fail_queries(&self, message: Option<&str>) {
        self.directory().query_failure = message.map(ToOwned::to_owned);
    }

    /// Delay every subsequent table query.
    pub fn delay_queries(&self, delay: Option<Duration>) {
        self.directory().query_delay = delay;
    }

    /// Accept credentials without returning an account identifier.
    pub fn omit_identifier(&self, omit: bool) {
        self.directory().omit_identifier = omit;
    }

    /// Number of sign-out calls received so far.
    #[must_use]
    pub fn sign_out_count(&self) -> usize {
        self.directory().sign_outs
    }
}

impl Backend for InMemoryBackend {
    type Client = InMemoryClient;

    fn connect(&self) -> Self::Client {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        InMemoryClient {
            backend: self.clone(),
            session: Mutex::new(None),
            events,
        }
    }

    async fn health(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// One visitor's client against an [`InMemoryBackend`].
#[derive(Debug)]
pub struct InMemoryClient {
    backend: InMemoryBackend,
    session: Mutex<Option<Identity>>,
    events: broadcast::Sender<AuthEvent>,
}

impl InMemoryClient {
    fn slot(&self) -> MutexGuard<'_, Option<Identity>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: AuthEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }

    /// Drop the session as if the provider revoked it elsewhere.
    pub fn expire_session(&self) {
        *self.slot() = None;
        self.publish(AuthEvent::SignedOut);
    }

    /// Pretend the provider rotated the access token.
    pub fn refresh_token(&self) {
        if self.slot().is_some() {
            self.publish(AuthEvent::TokenRefreshed);
        }
    }
}

impl AuthProvider for InMemoryClient {
    async fn current_session(&self) -> Result<Option<Identity>, BackendError> {
        Ok(self.slot().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Option<Identity>, BackendError> {
        let (account, omit_identifier) = {
            let directory = self.backend.directory();
            (
                directory.accounts.get(email.as_str()).cloned(),
                directory.omit_identifier,
            )
        };

        let account = account
            .filter(|account| account.password == password.expose_secret())
            .ok_or_else(|| BackendError::InvalidCredentials("Invalid login credentials".into()))?;
        if !account.confirmed {
            return Err(BackendError::EmailNotConfirmed);
        }

        let identity = Identity {
            id: account.id,
            email: Some(email.to_string()),
        };
        *self.slot() = Some(identity.clone());
        self.publish(AuthEvent::SignedIn);

        Ok((!omit_identifier).then_some(identity))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.backend.directory().sign_outs += 1;
        *self.slot() = None;
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }
}

impl RecordStore for InMemoryClient {
    async fn query_by_primary_key<T>(
        &self,
        table: &str,
        _columns: &str,
        id: Uuid,
    ) -> Result<Option<T>, BackendError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (delay, failure) = {
            let directory = self.backend.directory();
            (directory.query_delay, directory.query_failure.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = failure {
            return Err(BackendError::Api {
                status: 503,
                message,
            });
        }

        let key = id.to_string();
        let matches: Vec<Value> = self
            .backend
            .directory()
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.get("id").and_then(Value::as_str) == Some(key.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        match matches.as_slice() {
            [] => Ok(None),
            [row] => serde_json::from_value(row.clone())
                .map(Some)
                .map_err(|e| BackendError::Decode(e.to_string())),
            _ => Err(BackendError::Api {
                status: 406,
                message: format!("{} rows returned for a single-row lookup", matches.len()),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use campaign_core::Role;

    use super::*;

    fn password(s: &str) -> SecretString {
        SecretString::from(s.to_owned())
    }

    #[tokio::test]
    async fn test_clients_do_not_share_sessions() {
        let backend = InMemoryBackend::new();
        backend.add_account("admin@example.com", "Secret123!");
        let first = backend.connect();
        let second = backend.connect();

        let email = Email::parse("admin@example.com").unwrap();
        first
            .sign_in_with_password(&email, &password("Secret123!"))
            .await
            .unwrap();

        assert!(first.current_session().await.unwrap().is_some());
        assert!(second.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let backend = InMemoryBackend::new();
        backend.add_account("admin@example.com", "Secret123!");
        let client = backend.connect();

        let email = Email::parse("admin@example.com").unwrap();
        let err = client
            .sign_in_with_password(&email, &password("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidCredentials(_)));
        assert!(client.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_decodes_profile_row() {
        let backend = InMemoryBackend::new();
        let id = backend.add_account("mod@example.com", "pw");
        backend.insert_profile(&Profile {
            id,
            email: Email::parse("mod@example.com").unwrap(),
            name: "Modération".to_string(),
            role: Role::Moderator,
        });

        let client = backend.connect();
        let profile: Option<Profile> = client
            .query_by_primary_key(Profile::TABLE, Profile::COLUMNS, id.as_uuid())
            .await
            .unwrap();
        assert_eq!(profile.unwrap().role, Role::Moderator);

        let missing: Option<Profile> = client
            .query_by_primary_key(Profile::TABLE, Profile::COLUMNS, Uuid::new_v4())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_rows_are_an_error() {
        let backend = InMemoryBackend::new();
        let id = Uuid::new_v4();
        backend.insert_row("users", serde_json::json!({ "id": id }));
        backend.insert_row("users", serde_json::json!({ "id": id }));

        let client = backend.connect();
        let result: Result<Option<Value>, _> =
            client.query_by_primary_key("users", "id", id).await;
        assert!(matches!(result, Err(BackendError::Api { status: 406, .. })));
    }
}
