//! HTTP route handlers for admin.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (probes the auth service)
//!
//! GET  /                       - Redirect to dashboard
//! GET  /admin                  - Redirect to dashboard
//!
//! # Auth (email + password against the hosted auth service)
//! GET  /admin/login            - Login page (optional ?error=<code>)
//! POST /admin/login            - Sign in
//! POST /admin/logout           - Sign out
//!
//! # Dashboard (administrators only)
//! GET  /admin/dashboard        - Section overview
//! ```

pub mod auth;
pub mod dashboard;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Redirect,
    routing::get,
};

use crate::auth::DASHBOARD_PATH;
use crate::backend::Backend;
use crate::config::AdminConfig;
use crate::state::AppState;

/// Build the application router.
pub fn routes<B: Backend>(config: &AdminConfig) -> Router<AppState<B>> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness::<B>))
        .route("/", get(to_dashboard))
        .route("/admin", get(to_dashboard))
        .merge(auth::router(config))
        .merge(dashboard::router())
}

async fn to_dashboard() -> Redirect {
    Redirect::to(DASHBOARD_PATH)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the auth service is not reachable.
async fn readiness<B: Backend>(State(state): State<AppState<B>>) -> StatusCode {
    match state.ready().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
