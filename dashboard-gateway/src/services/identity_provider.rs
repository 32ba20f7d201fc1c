use async_trait::async_trait;
use gateway_core::observability::TracedClientExt;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

use crate::config::IdentityProviderSettings;
use crate::services::refresh::AssertionSource;

/// REST client for the external identity provider: password verification at
/// sign-in, and assertion re-derivation during silent refresh.
pub struct IdentityProviderClient {
    client: Client,
    settings: IdentityProviderSettings,
}

#[derive(Debug, Error)]
pub enum SignInError {
    #[error("identity provider rejected the password")]
    WrongPassword,

    #[error("no account matches the email address")]
    UnknownAccount,

    #[error("malformed email address")]
    MalformedEmail,

    #[error("identity provider rejected the credential: {0}")]
    Rejected(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl SignInError {
    /// Actionable text shown on the sign-in form. Never a raw error code.
    pub fn user_message(&self) -> &'static str {
        match self {
            SignInError::WrongPassword => "Incorrect password. Please try again.",
            SignInError::UnknownAccount => "No account found with that email address.",
            SignInError::MalformedEmail => "Please enter a valid email address.",
            _ => "Sign-in failed. Please try again.",
        }
    }
}

/// Token pair issued by the provider on a successful password grant.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub id_token: String,
    pub refresh_token: String,
}

#[derive(Deserialize)]
struct PasswordGrantResponse {
    #[serde(rename = "idToken")]
    id_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

#[derive(Deserialize)]
struct TokenGrantResponse {
    id_token: String,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<ProviderErrorDetail>,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: String,
}

impl IdentityProviderClient {
    pub fn new(settings: IdentityProviderSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    /// Verify an email/password pair with the provider.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderTokens, SignInError> {
        let url = format!(
            "{}/v1/accounts:signInWithPassword?key={}",
            self.settings.url.trim_end_matches('/'),
            self.settings.api_key.expose_secret()
        );

        let response = self
            .client
            .traced_post(&url)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_rejection(&body));
        }

        let tokens: PasswordGrantResponse = response.json().await?;
        Ok(ProviderTokens {
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Derive a fresh identity assertion from a provider refresh token.
    pub async fn refresh_id_token(&self, refresh_token: &str) -> Result<String, SignInError> {
        let url = format!(
            "{}/v1/token?key={}",
            self.settings.token_url.trim_end_matches('/'),
            self.settings.api_key.expose_secret()
        );

        let response = self
            .client
            .traced_post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_rejection(&body));
        }

        let grant: TokenGrantResponse = response.json().await?;
        Ok(grant.id_token)
    }
}

fn classify_rejection(body: &str) -> SignInError {
    let message = serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(|body| body.error)
        .map(|detail| detail.message)
        .unwrap_or_default();

    // Provider error codes sometimes carry a suffix, e.g.
    // "INVALID_PASSWORD : ...", so match on the leading code.
    if message.starts_with("INVALID_PASSWORD") || message.starts_with("INVALID_LOGIN_CREDENTIALS") {
        SignInError::WrongPassword
    } else if message.starts_with("EMAIL_NOT_FOUND") {
        SignInError::UnknownAccount
    } else if message.starts_with("INVALID_EMAIL") {
        SignInError::MalformedEmail
    } else {
        SignInError::Rejected(message)
    }
}

/// The live identity-provider session for one request.
///
/// Refresh must derive assertions from the provider, never replay one from
/// storage; the session only contributes the provider refresh token needed
/// to do that. Absence of the token means there is no live session.
pub struct ProviderSession<'a> {
    client: &'a IdentityProviderClient,
    refresh_token: Option<String>,
}

impl<'a> ProviderSession<'a> {
    pub fn new(client: &'a IdentityProviderClient, refresh_token: Option<String>) -> Self {
        Self {
            client,
            refresh_token,
        }
    }
}

#[async_trait]
impl AssertionSource for ProviderSession<'_> {
    async fn live_assertion(&self) -> Option<String> {
        let refresh_token = self.refresh_token.as_deref()?;
        match self.client.refresh_id_token(refresh_token).await {
            Ok(token) => Some(token),
            Err(error) => {
                tracing::warn!(error = %error, "could not re-derive identity assertion");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_provider_rejections() {
        let wrong = r#"{"error":{"message":"INVALID_PASSWORD"}}"#;
        assert!(matches!(
            classify_rejection(wrong),
            SignInError::WrongPassword
        ));

        let unknown = r#"{"error":{"message":"EMAIL_NOT_FOUND"}}"#;
        assert!(matches!(
            classify_rejection(unknown),
            SignInError::UnknownAccount
        ));

        let malformed = r#"{"error":{"message":"INVALID_EMAIL : bad address"}}"#;
        assert!(matches!(
            classify_rejection(malformed),
            SignInError::MalformedEmail
        ));

        let other = r#"{"error":{"message":"USER_DISABLED"}}"#;
        assert!(matches!(classify_rejection(other), SignInError::Rejected(m) if m == "USER_DISABLED"));
    }

    #[test]
    fn unparseable_rejections_fall_back_to_generic() {
        assert!(matches!(
            classify_rejection("<html>bad gateway</html>"),
            SignInError::Rejected(m) if m.is_empty()
        ));
    }

    #[test]
    fn user_messages_are_specific_and_actionable() {
        assert_eq!(
            SignInError::WrongPassword.user_message(),
            "Incorrect password. Please try again."
        );
        assert_eq!(
            SignInError::UnknownAccount.user_message(),
            "No account found with that email address."
        );
        assert_eq!(
            SignInError::MalformedEmail.user_message(),
            "Please enter a valid email address."
        );
        assert_eq!(
            SignInError::Rejected("USER_DISABLED".to_string()).user_message(),
            "Sign-in failed. Please try again."
        );
    }
}
