//! Session middleware configuration for admin.
//!
//! The cookie session carries a single value: the visitor key that selects
//! the visitor's session store in [`AppState`](crate::state::AppState).
//! Backend tokens never leave the server.

use tower_sessions::{Expiry, Session, SessionManagerLayer};

use campaign_core::define_uuid_id;

use super::session_store::MokaSessionStore;
use crate::config::AdminConfig;

/// Session cookie name for admin.
pub const SESSION_COOKIE_NAME: &str = "cm_admin_session";

/// Session expiry time in seconds (24 hours of inactivity).
const SESSION_EXPIRY_SECONDS: i64 = 24 * 60 * 60;

/// Keys stored in the cookie session.
pub mod session_keys {
    /// The visitor key.
    pub const VISITOR: &str = "visitor_key";
}

// Random per-browser key; unrelated to any backend identity.
define_uuid_id!(VisitorKey);

/// Create the session layer with a bounded in-memory store.
///
/// Sessions only point at in-process visitor state, which does not survive
/// a restart either.
#[must_use]
pub fn create_session_layer(config: &AdminConfig) -> SessionManagerLayer<MokaSessionStore> {
    SessionManagerLayer::new(MokaSessionStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Strict)
        .with_http_only(true)
        .with_path("/")
}

/// Return the visitor key of this session, assigning a new one on first
/// contact.
///
/// # Errors
///
/// Returns an error if the session store cannot be read or written.
pub async fn visitor_key(session: &Session) -> Result<VisitorKey, tower_sessions::session::Error> {
    if let Some(key) = session.get::<VisitorKey>(session_keys::VISITOR).await? {
        return Ok(key);
    }

    let key = VisitorKey::random();
    session.insert(session_keys::VISITOR, key).await?;
    tracing::debug!(visitor = %key, "Assigned visitor key");
    Ok(key)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_visitor_key_is_stable_within_a_session() {
        let session = Session::new(None, Arc::new(MokaSessionStore::default()), None);

        let first = visitor_key(&session).await.unwrap();
        let second = visitor_key(&session).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sessions_get_distinct_visitor_keys() {
        let store = Arc::new(MokaSessionStore::default());
        let a = Session::new(None, Arc::clone(&store), None);
        let b = Session::new(None, store, None);

        assert_ne!(
            visitor_key(&a).await.unwrap(),
            visitor_key(&b).await.unwrap()
        );
    }
}
