//! Campaign back-office library.
//!
//! Serves the administrator login and dashboard in front of the hosted
//! auth and database service. Exposed as a library so the binary and the
//! integration tests build the same router.
//!
//! # Security
//!
//! Only accounts whose profile carries the `admin` role may enter. Any other
//! signed-in account is signed out again before a page is rendered.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{Router, middleware::from_fn};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::backend::Backend;
use crate::middleware::{create_session_layer, security_headers_middleware};
use crate::state::AppState;

/// Build the complete application router around `state`.
///
/// Sentry layers are left to the binary so tests run without a hub.
pub fn app<B: Backend>(state: AppState<B>) -> Router {
    let session_layer = create_session_layer(state.config());

    routes::routes::<B>(state.config())
        .nest_service(
            "/static",
            ServeDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
        )
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}
