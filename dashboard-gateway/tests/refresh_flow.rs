mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use dashboard_gateway::AppState;
use dashboard_gateway::startup::build_router;
use tower::util::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_cookie(response: &axum::response::Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("pd_session="))
        .map(|v| v.split(';').next().unwrap().to_string())
        .expect("sign-in should set a session cookie")
}

async fn mount_sign_in_mocks(provider: &MockServer, backend: &MockServer, id_token: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "idToken": id_token,
            "refreshToken": "provider-rt",
            "expiresIn": "3600"
        })))
        .mount(provider)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/firebase-login/"))
        .and(body_json(serde_json::json!({ "id_token": id_token })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user": {
                "id": 42,
                "email": "lee@example.com",
                "first_name": "Lee",
                "last_name": "Landlord",
                "profile_image": null,
                "role": "landlord"
            }
        })))
        .mount(backend)
        .await;
}

async fn sign_in(app: &axum::Router) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/signin")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("email=lee@example.com&password=hunter2"))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn a_nearly_expired_token_is_silently_refreshed() {
    let provider = MockServer::start().await;
    let backend = MockServer::start().await;

    // Expires inside the 5-minute refresh window.
    let stale_token = common::make_id_token(chrono::Utc::now().timestamp() + 60);
    let fresh_token = common::make_id_token(chrono::Utc::now().timestamp() + 3600);

    mount_sign_in_mocks(&provider, &backend, &stale_token).await;

    // Assertion re-derivation from the live provider session.
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id_token": fresh_token
        })))
        .expect(1)
        .mount(&provider)
        .await;

    // The refreshed assertion goes through the exchange again.
    Mock::given(method("POST"))
        .and(path("/auth/firebase-login/"))
        .and(body_json(serde_json::json!({ "id_token": fresh_token })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user": {
                "id": 42,
                "email": "lee@example.com",
                "first_name": "Lee",
                "last_name": "Landlord",
                "profile_image": null,
                "role": "landlord"
            }
        })))
        .expect(1)
        .mount(&backend)
        .await;

    let app = build_router(AppState::new(common::test_settings(
        &backend.uri(),
        &provider.uri(),
    )));

    let cookie = session_cookie(&sign_in(&app).await);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/dashboard")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // The navigation is served with the refreshed credential, not bounced.
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn a_failed_refresh_invalidates_the_session() {
    let provider = MockServer::start().await;
    let backend = MockServer::start().await;

    let stale_token = common::make_id_token(chrono::Utc::now().timestamp() + 60);
    mount_sign_in_mocks(&provider, &backend, &stale_token).await;

    // The provider no longer honors the refresh token.
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "message": "TOKEN_EXPIRED" }
        })))
        .mount(&provider)
        .await;

    let app = build_router(AppState::new(common::test_settings(
        &backend.uri(),
        &provider.uri(),
    )));

    let cookie = session_cookie(&sign_in(&app).await);

    // Credentials are dropped, so the dashboard's user context is gone and
    // the visitor lands back on sign-in.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/dashboard")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/signin")
    );
}
