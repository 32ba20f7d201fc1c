use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use gateway_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use time::Duration;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::AppState;
use crate::handlers::{
    app::{health_check, index},
    auth::{signin_handler, signin_page, signout_handler, token_signin_handler},
    dashboard::{landlord_dashboard, tenant_dashboard},
    metrics::metrics,
};
use crate::middleware::{guard::route_guard, metrics::metrics_middleware};

pub fn build_router(state: AppState) -> Router {
    // Session setup
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_name(state.settings.server.session_cookie.clone())
        .with_secure(false) // Set to true in production with HTTPS
        .with_expiry(Expiry::OnInactivity(Duration::hours(24)));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/signin", get(signin_page).post(signin_handler))
        .route("/signin/token", post(token_signin_handler))
        .route("/tenant/signin", get(signin_page))
        .route("/signout", get(signout_handler))
        .route("/dashboard", get(landlord_dashboard))
        .route("/dashboard/tenant", get(tenant_dashboard))
        // The guard sits inside the session layer so every navigation is
        // gated with the freshest session state.
        .layer(from_fn_with_state(state.clone(), route_guard))
        .layer(session_layer)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
