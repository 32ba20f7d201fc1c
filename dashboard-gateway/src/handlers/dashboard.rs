use axum::{Json, response::IntoResponse};

use crate::models::user::AuthUser;

// The dashboard UI proper is rendered elsewhere; these endpoints hand the
// signed-in user context to it.

pub async fn landlord_dashboard(user: AuthUser) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": user.user_id,
        "email": user.email,
        "name": user.name,
        "image": user.image,
        "role": user.role,
    }))
}

pub async fn tenant_dashboard(user: AuthUser) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": user.user_id,
        "email": user.email,
        "name": user.name,
        "image": user.image,
        "role": user.role,
    }))
}
