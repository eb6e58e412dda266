//! Per-visitor session store.
//!
//! # Ordering
//!
//! Resolutions may overlap: an auth event can trigger a bootstrap while a
//! sign-in is still checking the profile. Every write carries a ticket from a
//! monotonically increasing counter and is applied only if it is newer than
//! the last applied write, so the most recently started resolution wins and
//! late answers from older ones are dropped.
//!
//! Sign-out and the forced clear after a failed sign-in take their ticket
//! once the remote session is gone. Any resolution still in flight at that
//! point is therefore stale, and any resolution started later sees no
//! remote session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::watch;
use tracing::instrument;

use campaign_core::{Email, Profile};

use super::{ProfileResolver, SignInError};
use crate::backend::{BackendError, Identity, RemoteClient, Subscription, on_session_change};

/// Observable state of a [`SessionStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    profile: Option<Profile>,
    loading: bool,
    applied_ticket: u64,
    pending_bootstraps: usize,
}

impl SessionState {
    const fn initial() -> Self {
        Self {
            profile: None,
            loading: true,
            applied_ticket: 0,
            pending_bootstraps: 0,
        }
    }

    /// The signed-in administrator, if any.
    #[must_use]
    pub const fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Whether a session bootstrap is in flight.
    ///
    /// Also true for a store that has never been bootstrapped.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }
}

/// Clears the loading flag when a bootstrap finishes, however it finishes.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<SessionState>,
}

impl<'a> LoadingGuard<'a> {
    fn begin(state: &'a watch::Sender<SessionState>) -> Self {
        state.send_modify(|state| {
            state.pending_bootstraps += 1;
            state.loading = true;
        });
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|state| {
            state.pending_bootstraps = state.pending_bootstraps.saturating_sub(1);
            state.loading = state.pending_bootstraps > 0;
        });
    }
}

/// One visitor's authenticated profile and the operations that change it.
pub struct SessionStore<C> {
    client: C,
    state: watch::Sender<SessionState>,
    next_ticket: AtomicU64,
}

impl<C: RemoteClient> SessionStore<C> {
    /// Create a store in the loading state. Call [`bootstrap`](Self::bootstrap)
    /// to resolve the current session.
    pub fn new(client: C) -> Self {
        let (state, _) = watch::channel(SessionState::initial());
        Self {
            client,
            state,
            next_ticket: AtomicU64::new(0),
        }
    }

    /// The remote client backing this store.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receive every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait until no bootstrap is in flight, or `timeout` elapses.
    ///
    /// Returns the state at that point, which may still be loading.
    pub async fn settled(&self, timeout: Duration) -> SessionState {
        let mut receiver = self.state.subscribe();
        match tokio::time::timeout(timeout, receiver.wait_for(|state| !state.loading)).await {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) | Err(_) => self.snapshot(),
        }
    }

    fn issue_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store `profile` unless a newer write was already applied.
    fn apply(&self, ticket: u64, profile: Option<Profile>) -> bool {
        self.state.send_if_modified(|state| {
            if ticket <= state.applied_ticket {
                tracing::debug!(
                    ticket,
                    applied = state.applied_ticket,
                    "Discarding stale session write"
                );
                return false;
            }
            state.applied_ticket = ticket;
            state.profile = profile;
            true
        })
    }

    /// Re-read the remote session and resolve the profile behind it.
    ///
    /// Runs at startup and after every remote auth event. Never fails: errors
    /// are logged and leave the visitor signed out.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) {
        let ticket = self.issue_ticket();
        let _loading = LoadingGuard::begin(&self.state);

        let profile = match self.resolve_current().await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve session");
                None
            }
        };
        self.apply(ticket, profile);
    }

    async fn resolve_current(&self) -> Result<Option<Profile>, BackendError> {
        let Some(identity) = self.client.current_session().await? else {
            return Ok(None);
        };

        let Some(profile) = ProfileResolver::new(&self.client)
            .fetch_by_auth_id(identity.id)
            .await?
        else {
            tracing::warn!(user_id = %identity.id, "No profile for signed-in user, signing out");
            self.ensure_signed_out().await;
            return Ok(None);
        };

        if !profile.role.may_enter_back_office() {
            tracing::warn!(
                user_id = %identity.id,
                role = %profile.role,
                "Profile is not an administrator, signing out"
            );
            self.ensure_signed_out().await;
            return Ok(None);
        }

        Ok(Some(profile))
    }

    /// Sign in with email and password.
    ///
    /// The profile is stored only once the identity, its profile row and its
    /// role have all been checked. Any failure after the provider accepted
    /// the credentials leaves no remote session behind.
    ///
    /// # Errors
    ///
    /// Returns the [`SignInError`] describing the first failed check.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Profile, SignInError> {
        let identity = self.client.sign_in_with_password(email, password).await?;
        let ticket = self.issue_ticket();

        match self.admit(identity).await {
            Ok(profile) => {
                tracing::info!(user_id = %profile.id, "Administrator signed in");
                self.apply(ticket, Some(profile.clone()));
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in refused");
                self.ensure_signed_out().await;
                let cleared = self.issue_ticket();
                self.apply(cleared, None);
                Err(e)
            }
        }
    }

    async fn admit(&self, identity: Option<Identity>) -> Result<Profile, SignInError> {
        let identity = identity.ok_or(SignInError::MissingIdentifier)?;

        let profile = ProfileResolver::new(&self.client)
            .fetch_by_auth_id(identity.id)
            .await
            .map_err(SignInError::Backend)?
            .ok_or(SignInError::ProfileNotFound)?;

        if !profile.role.may_enter_back_office() {
            return Err(SignInError::AccessDenied { role: profile.role });
        }
        Ok(profile)
    }

    /// End the session, whatever its state. Remote failures are logged.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        if let Err(e) = self.client.sign_out().await {
            tracing::warn!(error = %e, "Remote sign-out failed");
        }
        let ticket = self.issue_ticket();
        self.apply(ticket, None);
    }

    /// Sign out remotely and verify that no session remains.
    pub async fn ensure_signed_out(&self) {
        if let Err(e) = self.client.sign_out().await {
            tracing::warn!(error = %e, "Remote sign-out failed");
        }

        match self.client.current_session().await {
            Ok(None) => {}
            Ok(Some(identity)) => {
                tracing::error!(
                    user_id = %identity.id,
                    "Remote session still present after sign-out, retrying"
                );
                if let Err(e) = self.client.sign_out().await {
                    tracing::error!(error = %e, "Remote sign-out retry failed");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not verify remote sign-out");
            }
        }
    }

    /// Re-run [`bootstrap`](Self::bootstrap) on every remote auth event.
    ///
    /// The listener holds only a weak reference; it stops when the store is
    /// dropped or the returned handle is.
    #[must_use]
    pub fn listen(self: &Arc<Self>) -> Subscription {
        let store: Weak<Self> = Arc::downgrade(self);
        on_session_change(&self.client, move |event| {
            let store = store.clone();
            async move {
                if let Some(store) = store.upgrade() {
                    tracing::debug!(?event, "Auth state changed");
                    store.bootstrap().await;
                }
            }
        })
    }
}

impl<C> std::fmt::Debug for SessionStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.state.borrow())
            .field("next_ticket", &self.next_ticket)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use campaign_core::{ProfileId, Role};

    use super::*;
    use crate::backend::{AuthProvider, Backend, InMemoryBackend, InMemoryClient};

    const PASSWORD: &str = "Secret123!";

    fn password(s: &str) -> SecretString {
        SecretString::from(s.to_owned())
    }

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    fn provision(backend: &InMemoryBackend, address: &str, role: Option<Role>) -> ProfileId {
        let id = backend.add_account(address, PASSWORD);
        if let Some(role) = role {
            backend.insert_profile(&Profile {
                id,
                email: email(address),
                name: format!("{role} user"),
                role,
            });
        }
        id
    }

    fn fixture() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        provision(&backend, "admin@example.com", Some(Role::Admin));
        provision(&backend, "editor@example.com", Some(Role::Editor));
        provision(&backend, "ghost@example.com", None);
        backend
    }

    fn store(backend: &InMemoryBackend) -> SessionStore<InMemoryClient> {
        SessionStore::new(backend.connect())
    }

    #[tokio::test]
    async fn test_new_store_is_loading_without_profile() {
        let backend = fixture();
        let state = store(&backend).snapshot();
        assert!(state.is_loading());
        assert!(state.profile().is_none());
    }

    #[tokio::test]
    async fn test_admin_sign_in_stores_profile() {
        let backend = fixture();
        let store = store(&backend);

        let profile = store
            .sign_in(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap();

        assert_eq!(profile.role, Role::Admin);
        assert_eq!(store.snapshot().profile(), Some(&profile));
        assert!(store.client().current_session().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sign_in_without_profile_is_refused_and_signed_out() {
        let backend = fixture();
        let store = store(&backend);

        let err = store
            .sign_in(&email("ghost@example.com"), &password(PASSWORD))
            .await
            .unwrap_err();

        assert!(matches!(err, SignInError::ProfileNotFound));
        assert!(store.client().current_session().await.unwrap().is_none());
        assert!(store.snapshot().profile().is_none());
        assert!(backend.sign_out_count() >= 1);
    }

    #[tokio::test]
    async fn test_sign_in_as_editor_is_denied_and_signed_out() {
        let backend = fixture();
        let store = store(&backend);

        let err = store
            .sign_in(&email("editor@example.com"), &password(PASSWORD))
            .await
            .unwrap_err();

        assert!(matches!(err, SignInError::AccessDenied { role: Role::Editor }));
        assert!(store.client().current_session().await.unwrap().is_none());
        assert!(store.snapshot().profile().is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let backend = fixture();
        let store = store(&backend);

        let err = store
            .sign_in(&email("admin@example.com"), &password("wrong"))
            .await
            .unwrap_err();

        assert!(matches!(err, SignInError::InvalidCredentials));
        assert!(store.snapshot().profile().is_none());
    }

    #[tokio::test]
    async fn test_unconfirmed_email_is_reported() {
        let backend = fixture();
        backend.add_unconfirmed_account("new@example.com", PASSWORD);
        let store = store(&backend);

        let err = store
            .sign_in(&email("new@example.com"), &password(PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, SignInError::EmailNotConfirmed));
    }

    #[tokio::test]
    async fn test_missing_identifier_signs_out() {
        let backend = fixture();
        backend.omit_identifier(true);
        let store = store(&backend);

        let err = store
            .sign_in(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap_err();

        assert!(matches!(err, SignInError::MissingIdentifier));
        assert!(store.client().current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_lookup_failure_signs_out() {
        let backend = fixture();
        backend.fail_queries(Some("connection reset"));
        let store = store(&backend);

        let err = store
            .sign_in(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap_err();

        assert!(matches!(err, SignInError::Backend(_)));
        assert!(store.client().current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_is_idempotent() {
        let backend = fixture();
        let store = store(&backend);
        store
            .sign_in(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap();

        store.sign_out().await;
        assert!(store.snapshot().profile().is_none());
        store.sign_out().await;
        assert!(store.snapshot().profile().is_none());
        assert!(store.client().current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_without_session() {
        let backend = fixture();
        let store = store(&backend);

        store.bootstrap().await;

        let state = store.snapshot();
        assert!(!state.is_loading());
        assert!(state.profile().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_restores_admin_session() {
        let backend = fixture();
        let store = store(&backend);
        store
            .client()
            .sign_in_with_password(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap();

        store.bootstrap().await;

        let state = store.snapshot();
        assert!(!state.is_loading());
        assert_eq!(state.profile().map(|p| p.role), Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_bootstrap_signs_out_non_admin_session() {
        let backend = fixture();
        let store = store(&backend);
        store
            .client()
            .sign_in_with_password(&email("editor@example.com"), &password(PASSWORD))
            .await
            .unwrap();

        store.bootstrap().await;

        assert!(store.snapshot().profile().is_none());
        assert!(store.client().current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_signs_out_session_without_profile() {
        let backend = fixture();
        let store = store(&backend);
        store
            .client()
            .sign_in_with_password(&email("ghost@example.com"), &password(PASSWORD))
            .await
            .unwrap();

        store.bootstrap().await;

        assert!(store.snapshot().profile().is_none());
        assert!(store.client().current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_swallows_store_errors() {
        let backend = fixture();
        let store = store(&backend);
        store
            .client()
            .sign_in_with_password(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap();
        backend.fail_queries(Some("service unavailable"));

        store.bootstrap().await;

        let state = store.snapshot();
        assert!(!state.is_loading());
        assert!(state.profile().is_none());
    }

    #[tokio::test]
    async fn test_loading_while_bootstrap_in_flight() {
        let backend = fixture();
        backend.delay_queries(Some(Duration::from_millis(200)));
        let store = Arc::new(store(&backend));
        store
            .client()
            .sign_in_with_password(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap();

        let task = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.bootstrap().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.snapshot().is_loading());

        let state = store.settled(Duration::from_secs(2)).await;
        assert!(!state.is_loading());
        assert!(state.profile().is_some());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_settled_gives_up_after_timeout() {
        let backend = fixture();
        let store = store(&backend);

        let state = store.settled(Duration::from_millis(20)).await;
        assert!(state.is_loading());
    }

    #[test]
    fn test_stale_write_is_discarded() {
        let backend = fixture();
        let store = store(&backend);
        let profile = Profile {
            id: ProfileId::random(),
            email: email("admin@example.com"),
            name: "Admin".to_string(),
            role: Role::Admin,
        };

        let older = store.issue_ticket();
        let newer = store.issue_ticket();
        assert!(store.apply(newer, Some(profile.clone())));
        assert!(!store.apply(older, None));
        assert_eq!(store.snapshot().profile(), Some(&profile));
    }

    #[tokio::test]
    async fn test_slow_bootstrap_does_not_override_sign_out() {
        let backend = fixture();
        let store = Arc::new(store(&backend));
        store
            .client()
            .sign_in_with_password(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap();
        backend.delay_queries(Some(Duration::from_millis(200)));

        let task = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.bootstrap().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.sign_out().await;
        task.await.unwrap();

        let state = store.snapshot();
        assert!(!state.is_loading());
        assert!(state.profile().is_none());
    }

    #[tokio::test]
    async fn test_listener_clears_profile_after_remote_sign_out() {
        let backend = fixture();
        let store = Arc::new(store(&backend));
        let _subscription = store.listen();
        store
            .sign_in(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap();

        let mut states = store.subscribe();
        store.client().expire_session();

        let state = tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|state| state.profile().is_none() && !state.is_loading()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert!(state.profile().is_none());
    }

    #[tokio::test]
    async fn test_listener_keeps_profile_on_token_refresh() {
        let backend = fixture();
        let store = Arc::new(store(&backend));
        let _subscription = store.listen();
        store
            .sign_in(&email("admin@example.com"), &password(PASSWORD))
            .await
            .unwrap();

        store.client().refresh_token();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = store.settled(Duration::from_secs(2)).await;
        assert_eq!(state.profile().map(|p| p.role), Some(Role::Admin));
    }
}
