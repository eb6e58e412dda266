//! Integration tests for the campaign back-office.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p campaign-integration-tests
//! ```
//!
//! Each test starts the full admin router on an ephemeral port, backed by
//! an in-memory auth and profile store, and drives it over HTTP with a
//! cookie-keeping client.

use std::net::SocketAddr;

use campaign_admin::backend::InMemoryBackend;
use campaign_admin::config::{AdminConfig, SupabaseConfig};
use campaign_admin::state::AppState;
use campaign_core::{Email, Profile, ProfileId, Role};
use reqwest::{Client, redirect};
use secrecy::SecretString;
use url::Url;

/// Password given to every seeded account.
pub const PASSWORD: &str = "Campagne2026!";

/// A running back-office server.
pub struct TestContext {
    /// Directory behind the server; seed accounts here.
    pub backend: InMemoryBackend,
    /// Base URL of the server, without trailing slash.
    pub base_url: String,
}

impl TestContext {
    /// Start a server on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let backend = InMemoryBackend::new();
        let config = AdminConfig::new(SupabaseConfig {
            url: Url::parse("http://localhost:54321").expect("static URL"),
            anon_key: SecretString::from("anon"),
            service_key_in_env: false,
        });
        let app = campaign_admin::app(AppState::new(config, backend.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Test server error");
        });

        Self {
            backend,
            base_url: format!("http://{addr}"),
        }
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A browser-like client: keeps cookies, does not follow redirects.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client() -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client")
    }

    /// Create a confirmed account with [`PASSWORD`] and, when `role` is
    /// given, its profile row.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a valid address.
    pub fn seed(&self, email: &str, name: &str, role: Option<Role>) -> ProfileId {
        let id = self.backend.add_account(email, PASSWORD);
        if let Some(role) = role {
            self.backend.insert_profile(&Profile {
                id,
                email: Email::parse(email).expect("Invalid seed email"),
                name: name.to_string(),
                role,
            });
        }
        id
    }

    /// Submit the login form.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn login(&self, client: &Client, email: &str, password: &str) -> reqwest::Response {
        client
            .post(self.url("/admin/login"))
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .expect("Failed to submit login form")
    }
}
