use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use tower_sessions::Session;

use crate::AppState;
use crate::models::session::{self, Role, SessionData};
use crate::services::identity_provider::ProviderSession;
use crate::services::refresh;

/// Paths that must never be gated: static assets, the auth surface itself,
/// and the raw backend proxy. Gating any of these creates a redirect loop.
pub const BYPASS_PREFIXES: &[&str] = &["/_next", "/api/auth", "/api/v1"];

/// Operational endpoints, probed unauthenticated.
pub const OPS_ROUTES: &[&str] = &["/health", "/metrics"];

/// Public routes, matched by exact path or prefix.
pub const PUBLIC_ROUTES: &[&str] = &[
    "/signin",
    "/tenant/signin",
    "/signup",
    "/forgot-password",
    "/help",
    "/manifest.json",
];

pub const LANDLORD_HOME: &str = "/dashboard";
pub const TENANT_AREA_PREFIX: &str = "/dashboard/tenant";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Allow, with caching disabled so a gated page never outlives an auth
    /// or role change in a client or intermediary cache.
    AllowNoStore,
    Redirect {
        target: String,
        with_callback: bool,
    },
}

/// Decide what to do with a navigation, given the (possibly absent) session
/// record and whether a raw session cookie exists.
///
/// Cookie presence is checked independently of the record: the session
/// decode can fail transiently while the cookie is still there, and bouncing
/// such a user to sign-in would throw away a recoverable session.
pub fn evaluate(
    path: &str,
    record: Option<&SessionData>,
    has_session_cookie: bool,
    now_ms: i64,
) -> GuardDecision {
    if is_ungated(path) {
        return GuardDecision::Allow;
    }

    let record = match record {
        Some(record) => record,
        None if has_session_cookie => return GuardDecision::AllowNoStore,
        None => return signin_redirect(path),
    };

    // A decoded token that is already past its expiry is no better than no
    // token at all.
    if let Some(expiry) = record.token_expiry {
        if expiry < now_ms {
            return signin_redirect(path);
        }
    }

    if path == LANDLORD_HOME && record.role == Role::Tenant {
        return GuardDecision::Redirect {
            target: TENANT_AREA_PREFIX.to_string(),
            with_callback: false,
        };
    }
    if path.starts_with(TENANT_AREA_PREFIX) && record.role != Role::Tenant {
        return GuardDecision::Redirect {
            target: LANDLORD_HOME.to_string(),
            with_callback: false,
        };
    }

    GuardDecision::AllowNoStore
}

/// True for paths that are never gated, and for which the session is not
/// even consulted (so no refresh runs for asset fetches).
pub fn is_ungated(path: &str) -> bool {
    BYPASS_PREFIXES.iter().any(|p| path.starts_with(p))
        || OPS_ROUTES.contains(&path)
        || PUBLIC_ROUTES
            .iter()
            .any(|r| path == *r || path.starts_with(r))
}

fn signin_redirect(path: &str) -> GuardDecision {
    let target = if path.starts_with(TENANT_AREA_PREFIX) {
        "/tenant/signin"
    } else {
        "/signin"
    };

    // Redirecting a page to itself would loop forever.
    if target == path {
        GuardDecision::Allow
    } else {
        GuardDecision::Redirect {
            target: target.to_string(),
            with_callback: true,
        }
    }
}

/// Gate every navigation before page logic runs.
///
/// This is also the lazy access point for the refresh policy: the session is
/// read, refreshed when due, written back, and only then evaluated.
pub async fn route_guard(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match gate(&state, req, next).await {
        Ok(response) => response,
        Err(error) => {
            // Whatever broke, never surface the page ungated.
            tracing::error!(error = %error, "route guard evaluation failed");
            Redirect::to("/signin").into_response()
        }
    }
}

async fn gate(state: &AppState, req: Request<Body>, next: Next) -> anyhow::Result<Response> {
    let path = req.uri().path().to_string();

    // Ungated paths skip session work entirely; asset fetches must not
    // trigger refreshes.
    if is_ungated(&path) {
        return Ok(next.run(req).await);
    }

    let headers = req.headers().clone();

    let session = req
        .extensions()
        .get::<Session>()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("session layer missing from request"))?;

    let now_ms = chrono::Utc::now().timestamp_millis();

    let record = match session::load(&session).await {
        Some(record) => {
            let assertions = ProviderSession::new(
                state.identity_provider.as_ref(),
                record.provider_refresh_token.clone(),
            );
            let refreshed = refresh::refresh_if_needed(
                record.clone(),
                now_ms,
                &assertions,
                state.identity_client.as_ref(),
            )
            .await;

            if refreshed != record {
                session::store(&session, &refreshed).await?;
            }
            state.backend.apply_session(&refreshed);
            Some(refreshed)
        }
        None => None,
    };

    let has_cookie = has_session_cookie(&headers, &state.settings.server.session_cookie);
    let decision = evaluate(&path, record.as_ref(), has_cookie, now_ms);

    Ok(match decision {
        GuardDecision::Allow => next.run(req).await,
        GuardDecision::AllowNoStore => {
            let mut response = next.run(req).await;
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate"),
            );
            response
        }
        GuardDecision::Redirect {
            target,
            with_callback,
        } => {
            let url = absolute_redirect(
                &target,
                with_callback,
                state.settings.server.public_url.as_deref(),
                &headers,
            );
            Redirect::to(&url).into_response()
        }
    })
}

/// Check all cookie names the session may live under: the configured name,
/// plus the `__Secure-`/`__Host-` prefixed variants set by TLS-terminating
/// deployments.
fn has_session_cookie(headers: &HeaderMap, cookie_name: &str) -> bool {
    let jar = CookieJar::from_headers(headers);
    let secure = format!("__Secure-{cookie_name}");
    let host = format!("__Host-{cookie_name}");
    jar.get(cookie_name).is_some() || jar.get(&secure).is_some() || jar.get(&host).is_some()
}

/// The origin redirect URLs are built on. The configured public URL wins;
/// behind a reverse proxy the forwarded headers are the next best source.
fn base_origin(public_url: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(url) = public_url {
        return Some(url.trim_end_matches('/').to_string());
    }

    let host = headers.get(header::HOST)?.to_str().ok()?;
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    Some(format!("{proto}://{host}"))
}

fn absolute_redirect(
    target: &str,
    with_callback: bool,
    public_url: Option<&str>,
    headers: &HeaderMap,
) -> String {
    match base_origin(public_url, headers) {
        Some(base) => {
            if with_callback {
                let callback = format!("{base}{LANDLORD_HOME}");
                format!("{base}{target}?callbackUrl={}", urlencoding::encode(&callback))
            } else {
                format!("{base}{target}")
            }
        }
        None => target.to_string(),
    }
}
