use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

use crate::observability::trace_context::REQUEST_ID_HEADER;

/// Tag every request with a correlation id, minted here unless the caller
/// already sent one, and echo it on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match HeaderValue::from_str(&request_id) {
        Ok(value) => {
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
            let mut response = next.run(req).await;
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
            response
        }
        // A caller-supplied id that does not survive the trip back into a
        // header value is dropped, not propagated.
        Err(_) => next.run(req).await,
    }
}
