//! Back-office account management commands.
//!
//! Accounts are provisioned out-of-band with the service-role key, which
//! never reaches the back-office server.
//!
//! # Usage
//!
//! ```bash
//! cm-cli admin create -e admin@example.com -n "Admin Name" -r admin
//! cm-cli admin show -e admin@example.com
//! ```
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL` - Project URL
//! - `SUPABASE_SERVICE_KEY` - Service-role key (bypasses row policies)

use campaign_core::{Email, Profile, ProfileId, Role};
use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

/// Length of generated passwords.
const GENERATED_PASSWORD_LEN: usize = 24;

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 8;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Project URL could not be parsed.
    #[error("Invalid SUPABASE_URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The hosted API refused the request.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: admin, editor, moderator")]
    InvalidRole(String),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Password too short.
    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,

    /// User already exists.
    #[error("User already exists with email: {0}")]
    UserExists(String),

    /// No profile row for the email.
    #[error("No profile found for email: {0}")]
    NotFound(String),
}

/// Client for the service-role endpoints of the hosted backend.
struct ServiceClient {
    http: reqwest::Client,
    base: Url,
    service_key: SecretString,
}

/// Identity returned by the admin users endpoint.
#[derive(Debug, Deserialize)]
struct CreatedIdentity {
    id: ProfileId,
}

/// New identity for the admin users endpoint.
#[derive(Serialize)]
struct NewIdentity<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
    user_metadata: serde_json::Value,
}

impl ServiceClient {
    fn from_env() -> Result<Self, AdminError> {
        dotenvy::dotenv().ok();

        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| AdminError::MissingEnvVar("SUPABASE_URL"))?;
        let service_key = std::env::var("SUPABASE_SERVICE_KEY")
            .map_err(|_| AdminError::MissingEnvVar("SUPABASE_SERVICE_KEY"))?;

        Self::new(&url, SecretString::from(service_key))
    }

    fn new(url: &str, service_key: SecretString) -> Result<Self, AdminError> {
        let mut base = Url::parse(url)?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base,
            service_key,
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, AdminError> {
        let key = self.service_key.expose_secret();
        Ok(self
            .http
            .request(method, self.base.join(path)?)
            .header("apikey", key)
            .bearer_auth(key))
    }

    async fn create_identity(
        &self,
        email: &Email,
        name: &str,
        password: &SecretString,
    ) -> Result<ProfileId, AdminError> {
        let response = self
            .request(reqwest::Method::POST, "auth/v1/admin/users")?
            .json(&NewIdentity {
                email: email.as_str(),
                password: password.expose_secret(),
                email_confirm: true,
                user_metadata: json!({ "name": name }),
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let identity: CreatedIdentity = response.json().await?;
            return Ok(identity.id);
        }

        let message = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY && message.contains("already") {
            return Err(AdminError::UserExists(email.to_string()));
        }
        Err(AdminError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<(), AdminError> {
        let response = self
            .request(reqwest::Method::POST, "rest/v1/users")?
            .header("Prefer", "return=representation")
            .json(profile)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(AdminError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    async fn find_profile(&self, email: &Email) -> Result<Option<Profile>, AdminError> {
        let response = self
            .request(reqwest::Method::GET, "rest/v1/users")?
            .query(&[
                ("select", Profile::COLUMNS.to_string()),
                ("email", format!("eq.{email}")),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdminError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let rows: Vec<Profile> = response.json().await?;
        Ok(rows.into_iter().next())
    }
}

/// Generate a random alphanumeric password.
fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

fn parse_email(email: &str) -> Result<Email, AdminError> {
    Email::parse(email.trim()).map_err(|_| AdminError::InvalidEmail(email.to_owned()))
}

/// Create a new back-office account.
///
/// Creates a confirmed auth identity, then the `users` row sharing its id.
///
/// # Returns
///
/// The ID of the created account.
pub async fn create_user(
    email: &str,
    name: &str,
    role: &str,
    password: Option<String>,
) -> Result<ProfileId, AdminError> {
    let role: Role = role
        .parse()
        .map_err(|_| AdminError::InvalidRole(role.to_owned()))?;
    let email = parse_email(email)?;

    let generated = password.is_none();
    let password = SecretString::from(password.unwrap_or_else(generate_password));
    if password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
        return Err(AdminError::WeakPassword);
    }

    let client = ServiceClient::from_env()?;

    tracing::info!("Creating account: {} ({})", email, role);
    let id = client.create_identity(&email, name, &password).await?;

    let profile = Profile {
        id,
        email: email.clone(),
        name: name.to_owned(),
        role,
    };
    if let Err(e) = client.insert_profile(&profile).await {
        tracing::error!(
            "Identity {} was created but its profile row was not; insert it manually",
            id
        );
        return Err(e);
    }

    tracing::info!(
        "Account created successfully! ID: {}, Email: {}, Role: {}",
        id,
        email,
        role
    );
    if generated {
        tracing::info!("Generated password (shown once): {}", password.expose_secret());
    }
    if !role.may_enter_back_office() {
        tracing::warn!("Role {} cannot sign in to the back-office", role);
    }

    Ok(id)
}

/// Show the profile for an email.
pub async fn show_user(email: &str) -> Result<Profile, AdminError> {
    let email = parse_email(email)?;
    let client = ServiceClient::from_env()?;

    let profile = client
        .find_profile(&email)
        .await?
        .ok_or_else(|| AdminError::NotFound(email.to_string()))?;

    tracing::info!("  ID: {}", profile.id);
    tracing::info!("  Email: {}", profile.email);
    tracing::info!("  Name: {}", profile.name);
    tracing::info!("  Role: {}", profile.role);
    tracing::info!(
        "  Back-office access: {}",
        if profile.role.may_enter_back_office() { "yes" } else { "no" }
    );

    Ok(profile)
}
