use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use gateway_core::error::AppError;
use serde::Deserialize;
use tower_sessions::Session;
use validator::Validate;

use crate::AppState;
use crate::models::session::{self, SessionData};
use crate::services::identity_client::ExchangeError;
use crate::services::identity_provider::SignInError;
use crate::utils::jwt;

#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenSignInRequest {
    pub id_token: String,
}

pub async fn signin_page() -> impl IntoResponse {
    Json(serde_json::json!({ "page": "signin" }))
}

/// Email/password sign-in: verify with the identity provider, then exchange
/// the resulting assertion for a backend session.
pub async fn signin_handler(
    State(state): State<AppState>,
    session: Session,
    Form(payload): Form<SignInRequest>,
) -> Response {
    if payload.validate().is_err() {
        return rejection(SignInError::MalformedEmail.user_message());
    }

    let tokens = match state
        .identity_provider
        .sign_in_with_password(&payload.email, &payload.password)
        .await
    {
        Ok(tokens) => tokens,
        Err(SignInError::Transport(error)) => {
            tracing::error!(error = %error, "identity provider unreachable");
            return AppError::BadGateway("identity provider unreachable".to_string())
                .into_response();
        }
        Err(error) => {
            tracing::info!(error = %error, "sign-in rejected by identity provider");
            return rejection(error.user_message());
        }
    };

    complete_sign_in(
        &state,
        &session,
        &tokens.id_token,
        Some(tokens.refresh_token),
        payload.callback_url,
    )
    .await
}

/// Sign-in with a provider-issued identity token (the external-provider
/// flow, where the provider interaction already happened elsewhere).
pub async fn token_signin_handler(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<TokenSignInRequest>,
) -> Response {
    complete_sign_in(&state, &session, &payload.id_token, None, None).await
}

async fn complete_sign_in(
    state: &AppState,
    session: &Session,
    id_token: &str,
    provider_refresh_token: Option<String>,
    callback_url: Option<String>,
) -> Response {
    // A token without a readable expiry still signs in; it just won't be
    // silently refreshed.
    let token_expiry = jwt::expiry_ms(id_token).ok();

    let user = match state.identity_client.exchange(id_token).await {
        Ok(user) => user,
        Err(ExchangeError::Transport(error)) => {
            tracing::error!(error = %error, "property backend unreachable during sign-in");
            return AppError::BadGateway("property backend unreachable".to_string())
                .into_response();
        }
        Err(error) => {
            tracing::error!(error = %error, "credential exchange failed");
            return rejection("Authentication failed. Please try again.");
        }
    };

    let data = SessionData::from_sign_in(user, token_expiry, provider_refresh_token);
    if let Err(error) = session::store(session, &data).await {
        tracing::error!(error = %error, "failed to persist session");
        return AppError::InternalError(anyhow::anyhow!("session store failed")).into_response();
    }
    state.backend.apply_session(&data);

    tracing::info!(
        user_id = %data.user_id,
        email = %data.email,
        role = ?data.role,
        "user signed in"
    );

    let target = callback_url
        .filter(|url| url.starts_with('/') && !url.starts_with("//"))
        .unwrap_or_else(|| data.role.home_path().to_string());
    Redirect::to(&target).into_response()
}

pub async fn signout_handler(session: Session) -> impl IntoResponse {
    session.clear().await;
    tracing::info!("user signed out");
    Redirect::to("/signin")
}

// Error fragment for the sign-in form: actionable text, retry stays
// available, no raw error codes.
fn rejection(message: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}
