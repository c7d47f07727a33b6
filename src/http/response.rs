//! Response helpers shared by every plain route.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

/// A configured response header that is not valid HTTP.
#[derive(Debug, thiserror::Error)]
#[error("invalid response header {0:?}")]
pub struct InvalidResponseHeader(pub String);

/// Build the header map added to plain responses.
pub fn default_headers(pairs: &[(String, String)]) -> Result<HeaderMap, InvalidResponseHeader> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| InvalidResponseHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| InvalidResponseHeader(name.clone()))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Add every default header the handler did not set itself.
pub fn apply_default_headers(response: &mut Response, defaults: &HeaderMap) {
    let headers = response.headers_mut();
    for (name, value) in defaults {
        if !headers.contains_key(name) {
            headers.insert(name.clone(), value.clone());
        }
    }
}

/// Empty 400, sent when no plain route matches.
pub fn bad_request() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}
