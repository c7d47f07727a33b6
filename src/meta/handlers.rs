//! `ws-new-meta` and `ws-meta` endpoints.

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use serde::Serialize;

use crate::bare::codec::X_BARE_ID;
use crate::bare::{HeaderSet, TunnelError};
use crate::meta::MetaStore;

#[derive(Serialize)]
struct MetaBody {
    headers: Option<HeaderSet>,
}

/// Tab-indented JSON, the layout bare clients have always received.
fn to_tab_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

/// Allocate a meta ID and return it as the raw body.
pub async fn new_meta(store: MetaStore, _request: Request<Body>) -> Result<Response, TunnelError> {
    let id = store.create();
    tracing::debug!(meta_id = %id, "Meta entry created");
    Ok(Response::new(Body::from(id)))
}

/// Consume the entry named by `x-bare-id`.
pub async fn fetch_meta(store: MetaStore, request: Request<Body>) -> Result<Response, TunnelError> {
    if request.method() == Method::OPTIONS {
        return Ok(Response::new(Body::empty()));
    }

    let id = request
        .headers()
        .get(X_BARE_ID)
        .ok_or_else(|| TunnelError::protocol("x-bare-id is missing"))?
        .to_str()
        .map_err(|_| TunnelError::protocol("x-bare-id is not valid text"))?;

    let headers = store.consume(id);
    if headers.is_none() {
        tracing::debug!(meta_id = %id, "No metadata for meta ID");
    }

    let mut response = Response::new(Body::from(to_tab_json(&MetaBody { headers })?));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn meta_request(method: Method, id: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri("/bare/ws-meta");
        if let Some(id) = id {
            builder = builder.header(X_BARE_ID, id);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn new_meta_returns_registered_id() {
        let store = MetaStore::default();
        let response = new_meta(store.clone(), Request::new(Body::empty())).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let id = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(store.contains(&id));
    }

    #[tokio::test]
    async fn fetch_meta_consumes_attached_headers() {
        let store = MetaStore::default();
        let id = store.create();
        let mut headers = HeaderSet::new();
        headers.insert("sec-websocket-accept", "XYZ");
        store.attach_response(&id, headers);

        let response = fetch_meta(store.clone(), meta_request(Method::GET, Some(&id)))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let json = body_json(response).await;
        assert_eq!(json["headers"]["sec-websocket-accept"], "XYZ");

        let again = fetch_meta(store, meta_request(Method::GET, Some(&id)))
            .await
            .unwrap();
        assert!(body_json(again).await["headers"].is_null());
    }

    #[tokio::test]
    async fn fetch_meta_body_is_tab_indented() {
        let store = MetaStore::default();
        let response = fetch_meta(store, meta_request(Method::GET, Some("unknown")))
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"{\n\t\"headers\": null\n}");
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let store = MetaStore::default();
        let response = fetch_meta(store, meta_request(Method::OPTIONS, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn missing_id_is_a_protocol_error() {
        let store = MetaStore::default();
        let err = fetch_meta(store, meta_request(Method::GET, None))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
