//! Application state shared across handlers.
//!
//! Holds the process-wide backend handle and the registry of visitor
//! sessions. Each visitor (one browser cookie) gets its own remote client
//! and [`SessionStore`], created and bootstrapped on first contact.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::auth::SessionStore;
use crate::backend::{Backend, BackendError, Subscription};
use crate::config::AdminConfig;
use crate::middleware::session::VisitorKey;

/// Visitors idle for longer than this are forgotten, matching the cookie
/// session expiry.
const VISITOR_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on concurrently tracked visitors.
const MAX_VISITORS: u64 = 10_000;

/// One visitor's session store and the listener feeding it auth events.
#[derive(Debug)]
pub struct VisitorSession<C> {
    store: Arc<SessionStore<C>>,
    _subscription: Subscription,
}

impl<C> VisitorSession<C> {
    /// The visitor's session store.
    #[must_use]
    pub const fn store(&self) -> &Arc<SessionStore<C>> {
        &self.store
    }
}

/// Application state shared across all handlers.
pub struct AppState<B: Backend> {
    inner: Arc<AppStateInner<B>>,
}

impl<B: Backend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<B: Backend> {
    config: AdminConfig,
    backend: B,
    visitors: Cache<VisitorKey, Arc<VisitorSession<B::Client>>>,
}

impl<B: Backend> AppState<B> {
    /// Create application state around `backend`.
    #[must_use]
    pub fn new(config: AdminConfig, backend: B) -> Self {
        let visitors = Cache::builder()
            .max_capacity(MAX_VISITORS)
            .time_to_idle(VISITOR_IDLE_TIMEOUT)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                visitors,
            }),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    /// Get the backend handle.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Probe the backend for readiness.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if it cannot be reached.
    pub async fn ready(&self) -> Result<(), BackendError> {
        self.inner.backend.health().await
    }

    /// The session of visitor `key`, created on first contact.
    ///
    /// A new session starts loading and is bootstrapped in the background;
    /// it re-bootstraps on every auth event of its client.
    pub async fn visitor(&self, key: VisitorKey) -> Arc<VisitorSession<B::Client>> {
        let backend = self.inner.backend.clone();
        self.inner
            .visitors
            .get_with(key, async move {
                let store = Arc::new(SessionStore::new(backend.connect()));
                let subscription = store.listen();

                let bootstrapping = Arc::clone(&store);
                tokio::spawn(async move { bootstrapping.bootstrap().await });

                tracing::debug!(visitor = %key, "Created visitor session");
                Arc::new(VisitorSession {
                    store,
                    _subscription: subscription,
                })
            })
            .await
    }
}
