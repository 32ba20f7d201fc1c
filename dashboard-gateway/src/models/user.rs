use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::models::session::{self, Role};

/// Canonical user record produced by the credential exchange.
///
/// `access_token` is the cleaned identity assertion that was exchanged, not
/// a token minted by the backend; the backend response only contributes
/// identity attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub role: Role,
    pub access_token: String,
}

/// Authenticated user context extracted from the session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub role: Role,
    pub access_token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to extract session",
                )
                    .into_response()
            })?;

        match session::load(&session).await {
            Some(data) => match data.access_token {
                Some(token) => Ok(AuthUser {
                    user_id: data.user_id,
                    email: data.email,
                    name: data.name,
                    image: data.image,
                    role: data.role,
                    access_token: token,
                }),
                None => Err(Redirect::to("/signin").into_response()),
            },
            None => Err(Redirect::to("/signin").into_response()),
        }
    }
}

impl AuthUser {
    /// Returns the user ID header for propagating to the property backend.
    pub fn user_id_header(&self) -> (&str, &str) {
        ("X-User-ID", &self.user_id)
    }
}
