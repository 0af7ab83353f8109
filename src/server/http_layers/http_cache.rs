//! HTTP caching middleware

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// Stamp `Cache-Control: max-age=<n>` on successful responses. A zero
/// age disables caching altogether.
pub async fn http_cache(
    State(max_age_sec): State<usize>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    let value = if max_age_sec == 0 || !response.status().is_success() {
        HeaderValue::from_static("no-store")
    } else {
        match HeaderValue::from_str(&format!("max-age={}", max_age_sec)) {
            Ok(value) => value,
            Err(_) => return response,
        }
    };
    response.headers_mut().insert(header::CACHE_CONTROL, value);
    response
}
