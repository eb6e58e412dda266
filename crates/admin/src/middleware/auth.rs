//! Authentication extractors for admin.
//!
//! [`Visitor`] resolves the caller's session store from the cookie session.
//! [`RequireAdmin`] runs the route guard in front of a handler.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use campaign_core::Profile;

use super::session::visitor_key;
use crate::auth::{GuardState, LOGIN_PATH};
use crate::backend::Backend;
use crate::error::{AppError, set_sentry_user};
use crate::state::{AppState, VisitorSession};

/// Seconds the loading page waits before polling again.
const LOADING_REFRESH_SECONDS: u32 = 1;

/// The caller's visitor session.
pub struct Visitor<B: Backend>(pub Arc<VisitorSession<B::Client>>);

impl<B: Backend> FromRequestParts<AppState<B>> for Visitor<B> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<B>,
    ) -> Result<Self, Self::Rejection> {
        // Set by SessionManagerLayer
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer not installed".to_string()))?;

        let key = visitor_key(&session).await?;
        Ok(Self(state.visitor(key).await))
    }
}

/// Extractor that requires a signed-in administrator.
///
/// Waits up to `guard_settle` for an in-flight bootstrap, then:
/// - renders the handler for an administrator,
/// - redirects to the login page (401 under `/api/`) when nobody is signed in,
/// - answers with a self-refreshing loading page while the session is still
///   being resolved. It never redirects in that state.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAdmin(profile): RequireAdmin) -> impl IntoResponse {
///     format!("Bonjour, {}", profile.display_name())
/// }
/// ```
pub struct RequireAdmin(pub Profile);

/// Loading placeholder shown while the guard state is undecided.
#[derive(Template, WebTemplate)]
#[template(path = "guard/loading.html")]
pub struct LoadingTemplate {
    /// Page to poll.
    pub path: String,
    /// Seconds between polls.
    pub refresh_seconds: u32,
}

/// Why [`RequireAdmin`] did not let the request through.
pub enum AdminAuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// Session still resolving; poll `path` again.
    Pending {
        /// Path of the requested page.
        path: String,
        /// Whether the request targets the JSON API.
        api: bool,
    },
    /// The visitor session could not be loaded.
    Session(AppError),
}

impl IntoResponse for AdminAuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to(LOGIN_PATH).into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Pending { api: true, .. } => {
                let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(LOADING_REFRESH_SECONDS));
                response
            }
            Self::Pending { path, api: false } => LoadingTemplate {
                path,
                refresh_seconds: LOADING_REFRESH_SECONDS,
            }
            .into_response(),
            Self::Session(err) => err.into_response(),
        }
    }
}

impl<B: Backend> FromRequestParts<AppState<B>> for RequireAdmin {
    type Rejection = AdminAuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<B>,
    ) -> Result<Self, Self::Rejection> {
        let Visitor(visitor) = Visitor::<B>::from_request_parts(parts, state)
            .await
            .map_err(AdminAuthRejection::Session)?;

        let snapshot = visitor.store().settled(state.config().guard_settle).await;
        let is_api = parts.uri.path().starts_with("/api/");

        match GuardState::from(&snapshot) {
            GuardState::Authenticated(profile) => {
                set_sentry_user(&profile);
                Ok(Self(profile))
            }
            GuardState::Loading => Err(AdminAuthRejection::Pending {
                path: parts.uri.path().to_string(),
                api: is_api,
            }),
            GuardState::Unauthenticated if is_api => Err(AdminAuthRejection::Unauthorized),
            GuardState::Unauthenticated => Err(AdminAuthRejection::RedirectToLogin),
        }
    }
}
