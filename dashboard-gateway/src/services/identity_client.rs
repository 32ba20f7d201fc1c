use async_trait::async_trait;
use gateway_core::observability::TracedClientExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::config::BackendApiSettings;
use crate::models::session::Role;
use crate::models::user::CanonicalUser;
use crate::services::refresh::CredentialExchanger;

/// Client for the backend's credential-verification endpoint.
///
/// Holds its own `reqwest::Client` rather than sharing [`BackendClient`]'s:
/// the shared client attaches the current bearer token to every call, and an
/// exchange request must carry the assertion in its body only.
pub struct IdentityClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("login response did not contain a user id")]
    InvalidResponse,

    #[error("backend rejected the credential exchange: {status}")]
    Upstream { status: StatusCode, body: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    user: Option<BackendUser>,
}

#[derive(Debug, Deserialize)]
struct BackendUser {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    profile_image: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// Strip the transport prefix a caller may have left on the assertion.
/// A token garbled beyond that is sent as-is and fails upstream.
pub fn clean_assertion(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("Bearer ")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

impl IdentityClient {
    pub fn new(settings: BackendApiSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange an identity assertion for a canonical user record.
    ///
    /// The backend response contributes identity attributes only; the
    /// record's `access_token` is the cleaned input assertion, not a token
    /// minted by the backend.
    pub async fn exchange(&self, identity_assertion: &str) -> Result<CanonicalUser, ExchangeError> {
        let assertion = clean_assertion(identity_assertion);
        let url = format!("{}/auth/firebase-login/", self.base_url);

        let response = self
            .client
            .traced_post(&url)
            .header("accept", "application/json")
            .json(&serde_json::json!({ "id_token": assertion }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "backend rejected credential exchange");
            return Err(ExchangeError::Upstream { status, body });
        }

        let body = response.text().await?;
        let payload: LoginResponse =
            serde_json::from_str(&body).map_err(|_| ExchangeError::InvalidResponse)?;

        fold_user(assertion, payload)
    }
}

fn fold_user(assertion: String, payload: LoginResponse) -> Result<CanonicalUser, ExchangeError> {
    let user = payload.user.ok_or(ExchangeError::InvalidResponse)?;

    let id = match user.id {
        Some(serde_json::Value::String(id)) => id,
        Some(serde_json::Value::Number(id)) => id.to_string(),
        _ => return Err(ExchangeError::InvalidResponse),
    };

    let name = format!(
        "{} {}",
        user.first_name.unwrap_or_default(),
        user.last_name.unwrap_or_default()
    );

    let role = user
        .role
        .as_deref()
        .map(Role::from_backend)
        .unwrap_or(Role::Landlord);

    Ok(CanonicalUser {
        id,
        email: user.email.unwrap_or_default(),
        name,
        image: user.profile_image,
        role,
        access_token: assertion,
    })
}

#[async_trait]
impl CredentialExchanger for IdentityClient {
    async fn exchange(&self, identity_assertion: &str) -> Result<CanonicalUser, ExchangeError> {
        IdentityClient::exchange(self, identity_assertion).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_transport_prefix() {
        assert_eq!(clean_assertion("Bearer abc.def.ghi"), "abc.def.ghi");
        assert_eq!(clean_assertion("  Bearer abc.def.ghi "), "abc.def.ghi");
        assert_eq!(clean_assertion("abc.def.ghi"), "abc.def.ghi");
    }

    #[test]
    fn folds_backend_attributes_around_the_input_assertion() {
        let payload: LoginResponse = serde_json::from_str(
            r#"{"user":{"id":42,"email":"a@b.com","first_name":"A","last_name":"B","profile_image":null}}"#,
        )
        .unwrap();

        let user = fold_user("abc.def.ghi".to_string(), payload).unwrap();
        assert_eq!(user.id, "42");
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.name, "A B");
        assert_eq!(user.image, None);
        assert_eq!(user.role, Role::Landlord);
        assert_eq!(user.access_token, "abc.def.ghi");
    }

    #[test]
    fn string_ids_pass_through_and_roles_map() {
        let payload: LoginResponse = serde_json::from_str(
            r#"{"user":{"id":"u-9","email":"t@b.com","first_name":"T","last_name":"U","role":"tenant"}}"#,
        )
        .unwrap();

        let user = fold_user("tok".to_string(), payload).unwrap();
        assert_eq!(user.id, "u-9");
        assert_eq!(user.role, Role::Tenant);
    }

    #[test]
    fn missing_user_id_is_invalid_response() {
        let no_id: LoginResponse =
            serde_json::from_str(r#"{"user":{"email":"a@b.com"}}"#).unwrap();
        assert!(matches!(
            fold_user("tok".to_string(), no_id),
            Err(ExchangeError::InvalidResponse)
        ));

        let no_user: LoginResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(
            fold_user("tok".to_string(), no_user),
            Err(ExchangeError::InvalidResponse)
        ));

        let null_id: LoginResponse =
            serde_json::from_str(r#"{"user":{"id":null,"email":"a@b.com"}}"#).unwrap();
        assert!(matches!(
            fold_user("tok".to_string(), null_id),
            Err(ExchangeError::InvalidResponse)
        ));
    }
}
