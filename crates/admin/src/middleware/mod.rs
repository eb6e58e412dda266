//! HTTP middleware and extractors for admin.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Security headers
//! 4. Session layer (tower-sessions, bounded moka store)
//! 5. Rate limiter (login form only)

pub mod auth;
pub mod rate_limit;
pub mod security_headers;
pub mod session;
pub mod session_store;

pub use auth::{AdminAuthRejection, RequireAdmin, Visitor};
pub use rate_limit::login_rate_limiter;
pub use security_headers::security_headers_middleware;
pub use session::{SESSION_COOKIE_NAME, VisitorKey, create_session_layer};
pub use session_store::MokaSessionStore;
