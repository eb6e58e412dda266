//! Rate limiting for the login form using governor and `tower_governor`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Key extractor for the client address.
///
/// Uses the peer address unless a trusted proxy header is configured, in
/// which case that header wins. Any other forwarding header is ignored: a
/// client could rotate it freely.
///
/// The peer address needs the server to be started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone)]
pub struct ClientIpKeyExtractor {
    proxy_header: Option<HeaderName>,
}

impl ClientIpKeyExtractor {
    /// Extractor trusting `proxy_header` when set.
    #[must_use]
    pub const fn new(proxy_header: Option<HeaderName>) -> Self {
        Self { proxy_header }
    }

    fn client_ip<T>(&self, req: &Request<T>) -> Option<IpAddr> {
        self.proxy_header
            .as_ref()
            .and_then(|name| header_ip(req, name))
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
    }
}

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        self.client_ip(req).ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Address in `name`. For lists the last entry is the one the trusted proxy
/// appended.
fn header_ip<T>(req: &Request<T>, name: &HeaderName) -> Option<IpAddr> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.rsplit(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create the rate limiter for sign-in attempts: ~10 per minute per IP.
///
/// Configuration: 1 request every 6 seconds (replenish), burst of 5.
///
/// # Panics
///
/// This function will not panic. The configuration uses only valid positive
/// integers (`per_second(6)` and `burst_size(5)`), which are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn login_rate_limiter(proxy_header: Option<HeaderName>) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor::new(proxy_header))
        .per_second(6)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}
