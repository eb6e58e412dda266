//! Authentication route handlers for admin.
//!
//! Email and password are checked by the hosted auth service; the visitor's
//! session store then admits administrators only.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::Query,
    handler::Handler,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use campaign_core::Email;

use crate::auth::{DASHBOARD_PATH, LOGIN_PATH, SignInError};
use crate::backend::Backend;
use crate::config::AdminConfig;
use crate::middleware::{Visitor, login_rate_limiter};
use crate::state::AppState;

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    /// Email to pre-fill after a failed attempt.
    pub email: String,
    /// Message shown above the form.
    pub error: Option<String>,
}

/// Submitted login form.
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Query string of the login page.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
}

/// Build the auth router.
pub fn router<B: Backend>(config: &AdminConfig) -> Router<AppState<B>> {
    let limiter = login_rate_limiter(config.client_ip_header.clone());
    Router::new()
        .route(LOGIN_PATH, get(login_page::<B>).post(login::<B>.layer(limiter)))
        .route("/admin/logout", post(logout::<B>))
}

/// Message for a `?error=` code set by a redirect.
fn message_for_code(code: &str) -> Option<String> {
    let message = match code {
        "session_expired" => "Votre session a expiré. Veuillez vous reconnecter.",
        "access_denied" => "Accès refusé : vous n'êtes pas administrateur.",
        _ => return None,
    };
    Some(message.to_string())
}

/// HTTP status used when re-rendering the form after a refused sign-in.
const fn status_for(err: &SignInError) -> StatusCode {
    match err {
        SignInError::InvalidCredentials | SignInError::EmailNotConfirmed => {
            StatusCode::UNAUTHORIZED
        }
        SignInError::MissingIdentifier
        | SignInError::ProfileNotFound
        | SignInError::AccessDenied { .. } => StatusCode::FORBIDDEN,
        SignInError::Backend(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Render the login page.
///
/// GET /admin/login
async fn login_page<B: Backend>(
    Visitor(visitor): Visitor<B>,
    Query(query): Query<LoginQuery>,
) -> Response {
    if visitor.store().snapshot().profile().is_some() {
        return Redirect::to(DASHBOARD_PATH).into_response();
    }

    LoginTemplate {
        email: String::new(),
        error: query.error.as_deref().and_then(message_for_code),
    }
    .into_response()
}

/// Sign in and go to the dashboard.
///
/// POST /admin/login
#[instrument(skip_all)]
async fn login<B: Backend>(
    session: Session,
    Visitor(visitor): Visitor<B>,
    Form(form): Form<LoginForm>,
) -> Response {
    let email_input = form.email.trim().to_string();

    // Input that cannot name any account gets the same answer the provider
    // gives for unknown credentials.
    let Ok(email) = Email::parse(&email_input) else {
        let err = SignInError::InvalidCredentials;
        return (
            status_for(&err),
            LoginTemplate {
                email: email_input,
                error: Some(err.user_message()),
            },
        )
            .into_response();
    };
    let password = SecretString::from(form.password);

    match visitor.store().sign_in(&email, &password).await {
        Ok(_) => {
            // New cookie id for the authenticated session
            if let Err(e) = session.cycle_id().await {
                tracing::warn!(error = %e, "Failed to rotate session id");
            }
            Redirect::to(DASHBOARD_PATH).into_response()
        }
        Err(err) => {
            tracing::info!(email = %email, error = %err, "Login refused");
            (
                status_for(&err),
                LoginTemplate {
                    email: email_input,
                    error: Some(err.user_message()),
                },
            )
                .into_response()
        }
    }
}

/// Sign out and go back to the login page.
///
/// POST /admin/logout
async fn logout<B: Backend>(Visitor(visitor): Visitor<B>) -> Redirect {
    visitor.store().sign_out().await;
    Redirect::to(LOGIN_PATH)
}
