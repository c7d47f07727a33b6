//! HTTP tunnel: perform the remote request and wrap the answer in a
//! browser-safe envelope.
//!
//! # Envelope
//! ```text
//! HTTP/1.1 200 OK                       ← always 200
//! content-encoding: <remote value>      ← passed through for framing
//! content-length: <remote value>
//! x-bare-status: 404
//! x-bare-status-text: Not Found
//! x-bare-headers: {"x-test":"1",...}    ← every remote header, JSON
//!
//! <remote body, streamed unmodified>
//! ```

use axum::body::{Body, Bytes, HttpBody};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::BoxError;

use crate::bare::{
    decode_remote_and_headers, flatten, normalize_response_headers, HeaderSet, TunnelError,
};
use crate::observability::metrics;
use crate::tunnel::client::UpstreamClient;

pub const X_BARE_STATUS: &str = "x-bare-status";
pub const X_BARE_STATUS_TEXT: &str = "x-bare-status-text";
pub const X_CONTENT_ENCODING: &str = "x-content-encoding";

/// Tunnel one request to the remote named by its bare headers.
pub async fn tunnel_request(
    client: UpstreamClient,
    request: Request<Body>,
) -> Result<Response, TunnelError> {
    let result = forward(&client, request).await;
    metrics::record_http_tunnel(match &result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    });
    result
}

async fn forward(client: &UpstreamClient, request: Request<Body>) -> Result<Response, TunnelError> {
    let (parts, body) = request.into_parts();
    let (remote, headers) = decode_remote_and_headers(&parts.headers)?;
    let uri = remote.to_uri()?;

    let mut outbound = Request::new(body);
    *outbound.method_mut() = parts.method;
    *outbound.uri_mut() = uri;
    *outbound.headers_mut() = headers.to_header_map()?;

    tracing::debug!(remote = %remote, method = %outbound.method(), "Tunnelling request");

    let response = client
        .request(outbound)
        .await
        .map_err(|source| TunnelError::UpstreamConnect {
            target: remote.to_string(),
            source,
        })?;

    tracing::debug!(remote = %remote, status = %response.status(), "Remote responded");
    envelope(response)
}

/// One header slot carrying every value of `name`.
fn passthrough(set: &HeaderSet, name: &str) -> Option<HeaderValue> {
    set.get(name)
        .map(flatten)
        .and_then(|value| HeaderValue::from_str(&value).ok())
}

/// Wrap a remote response: status 200 outside, real status and headers in
/// `x-bare-*`, body untouched.
pub fn envelope<B>(response: Response<B>) -> Result<Response, TunnelError>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = response.into_parts();

    let status_text = parts
        .extensions
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .unwrap_or_else(|| parts.status.canonical_reason().unwrap_or_default().to_string());

    let remote_headers = normalize_response_headers(&parts.headers);
    let bare_headers = serde_json::to_string(&remote_headers)?;

    let mut headers = HeaderMap::new();
    let encoding = passthrough(&remote_headers, header::CONTENT_ENCODING.as_str())
        .or_else(|| passthrough(&remote_headers, X_CONTENT_ENCODING));
    if let Some(encoding) = encoding {
        headers.insert(header::CONTENT_ENCODING, encoding);
    }
    if let Some(length) = passthrough(&remote_headers, header::CONTENT_LENGTH.as_str()) {
        headers.insert(header::CONTENT_LENGTH, length);
    }
    headers.insert(
        HeaderName::from_static("x-bare-headers"),
        HeaderValue::from_bytes(bare_headers.as_bytes())?,
    );
    headers.insert(
        HeaderName::from_static(X_BARE_STATUS),
        HeaderValue::from(parts.status.as_u16()),
    );
    headers.insert(
        HeaderName::from_static(X_BARE_STATUS_TEXT),
        HeaderValue::from_str(&status_text).unwrap_or_else(|_| HeaderValue::from_static("")),
    );

    let mut envelope = Response::new(Body::new(body));
    *envelope.status_mut() = StatusCode::OK;
    *envelope.headers_mut() = headers;
    Ok(envelope)
}
