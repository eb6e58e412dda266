//! Relational API calls (`/rest/v1`).

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use uuid::Uuid;

use super::Endpoints;
use crate::backend::BackendError;

/// Error body returned by the relational API.
#[derive(Debug, Default, Deserialize)]
struct RestErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

impl RestErrorResponse {
    fn into_message(self) -> String {
        let mut message = self.message.unwrap_or_else(|| "unknown error".to_string());
        if let Some(details) = self.details {
            message.push_str(" (");
            message.push_str(&details);
            message.push(')');
        }
        if let Some(hint) = self.hint {
            message.push_str(" hint: ");
            message.push_str(&hint);
        }
        message
    }
}

/// Reduce a result set to at most one row.
fn single_row<T: DeserializeOwned>(
    rows: Vec<serde_json::Value>,
) -> Result<Option<T>, BackendError> {
    let count = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), count) {
        (None, _) => Ok(None),
        (Some(row), 1) => serde_json::from_value(row)
            .map(Some)
            .map_err(|e| BackendError::Decode(e.to_string())),
        (Some(_), _) => Err(BackendError::Api {
            status: 406,
            message: format!("{count} rows returned for a single-row lookup"),
        }),
    }
}

/// `GET /rest/v1/{table}?id=eq.{id}&select={columns}`.
///
/// Requests are made as the signed-in user when an access token is
/// available so row-level security applies, and as the public role
/// otherwise.
///
/// # Errors
///
/// Returns `BackendError::Api` for error statuses or when more than one row
/// matches, `BackendError::Decode` if a row has the wrong shape.
#[instrument(skip(http, endpoints, anon_key, access_token), fields(table = %table, id = %id))]
pub async fn select_by_id<T: DeserializeOwned>(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    anon_key: &SecretString,
    access_token: Option<&SecretString>,
    table: &str,
    columns: &str,
    id: Uuid,
) -> Result<Option<T>, BackendError> {
    let url = endpoints.rest.join(table)?;
    let bearer = access_token.unwrap_or(anon_key);

    let response = http
        .get(url)
        .query(&[("id", format!("eq.{id}")), ("select", columns.to_owned())])
        .header("apikey", anon_key.expose_secret())
        .bearer_auth(bearer.expose_secret())
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body: RestErrorResponse = response.json().await.unwrap_or_default();
        return Err(BackendError::Api {
            status: status.as_u16(),
            message: body.into_message(),
        });
    }

    let rows: Vec<serde_json::Value> = response
        .json()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    single_row(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use campaign_core::{Profile, Role};

    use super::*;

    #[test]
    fn test_single_row_empty_is_none() {
        let row: Option<Profile> = single_row(Vec::new()).unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn test_single_row_decodes() {
        let rows = vec![serde_json::json!({
            "id": "0b6e1f52-8a0c-4f3a-9d1e-7c2b5a4e3f10",
            "email": "admin@example.com",
            "role": "admin",
            "name": "Admin"
        })];
        let profile: Profile = single_row(rows).unwrap().unwrap();
        assert_eq!(profile.role, Role::Admin);
    }

    #[test]
    fn test_single_row_rejects_duplicates() {
        let rows = vec![serde_json::json!({}), serde_json::json!({})];
        let result: Result<Option<serde_json::Value>, _> = single_row(rows);
        assert!(matches!(result, Err(BackendError::Api { status: 406, .. })));
    }

    #[test]
    fn test_single_row_bad_shape_is_decode_error() {
        let rows = vec![serde_json::json!({ "id": "not-a-uuid" })];
        let result: Result<Option<Profile>, _> = single_row(rows);
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[test]
    fn test_error_message_includes_details() {
        let body: RestErrorResponse = serde_json::from_value(serde_json::json!({
            "code": "42501",
            "message": "permission denied for table users",
            "details": null,
            "hint": "check row level security"
        }))
        .unwrap();
        assert_eq!(
            body.into_message(),
            "permission denied for table users hint: check row level security"
        );
    }
}
