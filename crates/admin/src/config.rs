//! Admin configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Project URL (falls back to `VITE_SUPABASE_URL`)
//! - `SUPABASE_ANON_KEY` - Public anon key (falls back to `VITE_SUPABASE_ANON_KEY`)
//!
//! ## Optional
//! - `ADMIN_HOST` - Bind address (default: 127.0.0.1)
//! - `ADMIN_PORT` - Listen port (default: 3001)
//! - `ADMIN_BASE_URL` - Public URL for the back-office (default: `http://localhost:3001`)
//! - `ADMIN_GUARD_SETTLE_MS` - How long protected pages wait for a session
//!   bootstrap before rendering the loading page (default: 1500)
//! - `ADMIN_CLIENT_IP_HEADER` - Header set by the trusted reverse proxy with
//!   the client address, used to key the login rate limiter (default:
//!   `fly-client-ip` on Fly.io, otherwise none and the peer address is used)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! ## Optional (TLS)
//! - `ADMIN_TLS_CERT` - PEM-encoded certificate chain
//! - `ADMIN_TLS_KEY` - PEM-encoded private key
//!
//! The service-role key (`SUPABASE_SERVICE_KEY`) is for the provisioning CLI
//! only. The server refuses to start with a service-role key in
//! `SUPABASE_ANON_KEY` and warns if the service key is present at all.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::http::HeaderName;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_GUARD_SETTLE_MS: u64 = 1500;
const DEFAULT_BASE_URL: &str = "http://localhost:3001";
const FLY_CLIENT_IP_HEADER: &str = "fly-client-ip";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// JWT role claims that must never be handed to the server.
const PRIVILEGED_ROLES: &[&str] = &["service_role", "supabase_admin"];

/// Prefix of non-JWT secret API keys.
const SECRET_KEY_PREFIX: &str = "sb_secret_";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Admin application configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the back-office
    pub base_url: String,
    /// Hosted backend configuration
    pub supabase: SupabaseConfig,
    /// How long the route guard waits for an in-flight bootstrap
    pub guard_settle: Duration,
    /// Proxy header trusted for the client address; peer address when `None`
    pub client_ip_header: Option<HeaderName>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// Hosted backend configuration.
///
/// Implements `Debug` manually to redact the key.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL
    pub url: Url,
    /// Public anon key
    pub anon_key: SecretString,
    /// Whether `SUPABASE_SERVICE_KEY` was found in the environment (logged
    /// as a warning at startup)
    pub service_key_in_env: bool,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("service_key_in_env", &self.service_key_in_env)
            .finish()
    }
}

impl SupabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_url = get_env_with_fallback("SUPABASE_URL", "VITE_SUPABASE_URL")?;
        let url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidEnvVar("SUPABASE_URL".to_string(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                "SUPABASE_URL".to_string(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        let anon_key = get_env_with_fallback("SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY")?;
        validate_anon_key(&anon_key, "SUPABASE_ANON_KEY")?;

        Ok(Self {
            url,
            anon_key: SecretString::from(anon_key),
            service_key_in_env: get_optional_env("SUPABASE_SERVICE_KEY").is_some(),
        })
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("ADMIN_TLS_CERT");
        let key_pem = get_optional_env("ADMIN_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "ADMIN_TLS_*".to_string(),
                "Both ADMIN_TLS_CERT and ADMIN_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl AdminConfig {
    /// Configuration with local defaults for everything but the backend.
    #[must_use]
    pub fn new(supabase: SupabaseConfig) -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3001,
            base_url: DEFAULT_BASE_URL.to_string(),
            supabase,
            guard_settle: Duration::from_millis(DEFAULT_GUARD_SETTLE_MS),
            client_ip_header: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
            tls: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// or if the anon key is a privileged key.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("ADMIN_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("ADMIN_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_PORT".to_string(), e.to_string()))?;
        let base_url = get_env_or_default("ADMIN_BASE_URL", DEFAULT_BASE_URL);
        let guard_settle_ms = get_env_or_default(
            "ADMIN_GUARD_SETTLE_MS",
            &DEFAULT_GUARD_SETTLE_MS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("ADMIN_GUARD_SETTLE_MS".to_string(), e.to_string())
        })?;

        let client_ip_header = parse_client_ip_header(
            get_optional_env("ADMIN_CLIENT_IP_HEADER"),
            std::env::var("FLY_APP_NAME").is_ok(),
        )?;

        let supabase = SupabaseConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let tls = TlsConfig::from_env()?;

        Ok(Self {
            host,
            port,
            base_url,
            supabase,
            guard_settle: Duration::from_millis(guard_settle_ms),
            client_ip_header,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the back-office is served over HTTPS (secure cookies).
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Resolve the trusted client-address header.
///
/// Proxy headers are only trusted when configured, or on Fly.io where the
/// edge proxy always overwrites `fly-client-ip`.
fn parse_client_ip_header(
    raw: Option<String>,
    on_fly: bool,
) -> Result<Option<HeaderName>, ConfigError> {
    let Some(raw) = raw.or_else(|| on_fly.then(|| FLY_CLIENT_IP_HEADER.to_string())) else {
        return Ok(None);
    };
    HeaderName::from_bytes(raw.trim().to_ascii_lowercase().as_bytes())
        .map(Some)
        .map_err(|e| {
            ConfigError::InvalidEnvVar("ADMIN_CLIENT_IP_HEADER".to_string(), e.to_string())
        })
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required variable, accepting the frontend build's name as a fallback.
fn get_env_with_fallback(primary_key: &str, fallback_key: &str) -> Result<String, ConfigError> {
    get_required_env(primary_key)
        .or_else(|_| get_required_env(fallback_key))
        .map_err(|_| ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key from the project's API settings."
            ),
        ));
    }

    Ok(())
}

/// The `role` claim of a JWT, without verifying its signature.
///
/// Returns `None` if `token` is not a three-part JWT with a JSON payload.
fn jwt_role(token: &str) -> Option<String> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("role")?.as_str().map(ToOwned::to_owned)
}

/// Check that `key` is a public key the server may hold.
///
/// JWT keys are checked by their `role` claim; other keys must not be secret
/// keys and must look like real keys.
fn validate_anon_key(key: &str, var_name: &str) -> Result<(), ConfigError> {
    if let Some(role) = jwt_role(key) {
        if PRIVILEGED_ROLES.contains(&role.as_str()) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("key has role '{role}'; use the public anon key, never the service key"),
            ));
        }
        return Ok(());
    }

    if key.starts_with(SECRET_KEY_PREFIX) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "secret API keys must not be used by the server; use the publishable key".to_string(),
        ));
    }
    validate_secret_strength(key, var_name)
}
