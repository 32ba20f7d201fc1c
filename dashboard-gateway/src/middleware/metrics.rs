use crate::services::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Asset fetches carry hashed bundle names; one label covers them all.
fn path_label(path: &str) -> String {
    if path.starts_with("/_next") {
        "/_next/*".to_string()
    } else {
        path.to_string()
    }
}

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = path_label(req.uri().path());

    let response = next.run(req).await;

    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();
    let labels = [method.as_str(), path.as_str(), status.as_str()];

    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter.with_label_values(&labels).inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram.with_label_values(&labels).observe(elapsed);
    }

    response
}
