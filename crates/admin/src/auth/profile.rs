//! Profile lookup by identity id.

use tracing::instrument;

use campaign_core::{Profile, ProfileId};

use crate::backend::{BackendError, RecordStore};

/// Resolves the application profile of an authenticated identity.
#[derive(Debug, Clone, Copy)]
pub struct ProfileResolver<'a, S> {
    store: &'a S,
}

impl<'a, S: RecordStore> ProfileResolver<'a, S> {
    /// Resolve profiles through `store`.
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Fetch the `users` row whose id equals the identity id.
    ///
    /// Returns `Ok(None)` when no row matches.
    ///
    /// # Errors
    ///
    /// Propagates transport and permission errors from the store.
    #[instrument(skip(self))]
    pub async fn fetch_by_auth_id(&self, id: ProfileId) -> Result<Option<Profile>, BackendError> {
        self.store
            .query_by_primary_key(Profile::TABLE, Profile::COLUMNS, id.as_uuid())
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use campaign_core::{Email, Role};

    use super::*;
    use crate::backend::{Backend, InMemoryBackend};

    #[tokio::test]
    async fn test_fetch_by_auth_id() {
        let backend = InMemoryBackend::new();
        let id = backend.add_account("admin@example.com", "Secret123!");
        let profile = Profile {
            id,
            email: Email::parse("admin@example.com").unwrap(),
            name: "Admin".to_string(),
            role: Role::Admin,
        };
        backend.insert_profile(&profile);

        let client = backend.connect();
        let resolver = ProfileResolver::new(&client);
        assert_eq!(resolver.fetch_by_auth_id(id).await.unwrap(), Some(profile));
        assert_eq!(
            resolver.fetch_by_auth_id(ProfileId::random()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_fetch_by_auth_id_propagates_store_errors() {
        let backend = InMemoryBackend::new();
        backend.fail_queries(Some("permission denied for table users"));

        let client = backend.connect();
        let err = ProfileResolver::new(&client)
            .fetch_by_auth_id(ProfileId::random())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 503, .. }));
    }
}
