//! Unified error handling for admin.
//!
//! Refused sign-ins are not errors at this level: the login handler renders
//! them. What remains are failures of the request plumbing itself.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use campaign_core::Profile;

/// Application-level error type for the back-office.
#[derive(Debug, Error)]
pub enum AppError {
    /// Cookie session could not be read or written.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let event_id = sentry::capture_error(&self);
        tracing::error!(
            error = %self,
            sentry_event_id = %event_id,
            "Admin request error"
        );

        // Don't expose internal error details to clients
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
}

/// Set the Sentry user context from the signed-in profile.
pub fn set_sentry_user(profile: &Profile) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(profile.id.to_string()),
            email: Some(profile.email.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use campaign_core::{Email, ProfileId, Role};

    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Internal("session layer not installed".to_string());
        assert_eq!(err.to_string(), "Internal error: session layer not installed");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = AppError::Internal("visitor cache poisoned".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Internal server error");
    }

    #[test]
    fn test_sentry_user_is_attached_to_events() {
        let profile = Profile {
            id: ProfileId::random(),
            email: Email::parse("admin@example.com").unwrap(),
            name: "Admin".to_string(),
            role: Role::Admin,
        };

        let events = sentry::test::with_captured_events(|| {
            set_sentry_user(&profile);
            sentry::capture_message("dashboard viewed", sentry::Level::Info);
        });

        let user = events[0].user.as_ref().unwrap();
        assert_eq!(user.email.as_deref(), Some("admin@example.com"));
        assert_eq!(user.id, Some(profile.id.to_string()));
    }
}
