//! WebSocket tunnel.
//!
//! # Handshake
//! ```text
//! AWAIT_SUBPROTOCOL ──► VALIDATE_SUBPROTOCOL ──► CONNECT_REMOTE ──► RELAY ──► CLOSED
//!         │                     │                      │
//!         └─────────────────────┴──────────────────────┴──► REJECT (connection dropped)
//! ```
//!
//! The remote leg is fully resolved (101 received, or failed) before the
//! browser sees any handshake bytes. After the 101 the tunnel is a plain
//! byte relay; frames are never inspected.

use axum::body::Body;
use axum::http::header::{
    self, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_PROTOCOL,
};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use hyper_util::rt::TokioIo;
use tracing::Instrument;

use crate::bare::codec::BARE_SUBPROTOCOL;
use crate::bare::{
    decode_socket_protocol, load_forwarded_headers, normalize_response_headers,
    SocketProtocolData, TunnelError,
};
use crate::meta::MetaStore;
use crate::observability::metrics;
use crate::tunnel::client::UpstreamClient;
use crate::tunnel::relay::relay;

/// Tunnel one WebSocket upgrade.
///
/// On success the returned response is the 101 to send to the browser and
/// the relay is already waiting for both upgrades. Any error means the
/// inbound connection must be closed without a response.
pub async fn tunnel_socket(
    client: UpstreamClient,
    meta: MetaStore,
    request: Request<Body>,
) -> Result<Response, TunnelError> {
    let result = upgrade(&client, &meta, request).await;
    metrics::record_socket_tunnel(match &result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    });
    result
}

async fn upgrade(
    client: &UpstreamClient,
    meta: &MetaStore,
    mut request: Request<Body>,
) -> Result<Response, TunnelError> {
    let protocol = request
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .ok_or_else(|| TunnelError::protocol("Sec-WebSocket-Protocol is missing"))?
        .to_str()
        .map_err(|_| TunnelError::protocol("Sec-WebSocket-Protocol is not valid text"))?;

    let SocketProtocolData {
        remote,
        mut headers,
        forward_headers,
        id,
    } = decode_socket_protocol(protocol)?;
    load_forwarded_headers(&forward_headers, &mut headers, request.headers());

    let mut outbound = Request::new(Body::empty());
    *outbound.method_mut() = request.method().clone();
    *outbound.uri_mut() = remote.to_uri()?;
    *outbound.headers_mut() = headers.to_header_map()?;

    tracing::debug!(remote = %remote, "Opening remote WebSocket");

    let mut remote_response = client
        .request(outbound)
        .await
        .map_err(|source| TunnelError::UpstreamConnect {
            target: remote.to_string(),
            source,
        })?;

    if remote_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(TunnelError::UpstreamRejectedUpgrade(remote_response.status()));
    }

    let accept = remote_response
        .headers()
        .get(SEC_WEBSOCKET_ACCEPT)
        .cloned()
        .ok_or(TunnelError::UpstreamHandshake("missing Sec-WebSocket-Accept"))?;
    let extensions = remote_response.headers().get(SEC_WEBSOCKET_EXTENSIONS).cloned();

    if let Some(id) = id.as_deref() {
        let headers = normalize_response_headers(remote_response.headers());
        if meta.attach_response(id, headers) {
            tracing::debug!(meta_id = %id, "Remote handshake headers stored");
        }
    }

    let remote_upgrade = hyper::upgrade::on(&mut remote_response);
    let client_upgrade = hyper::upgrade::on(&mut request);

    tokio::spawn(
        async move {
            let (client_io, remote_io) = match tokio::try_join!(client_upgrade, remote_upgrade) {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "WebSocket upgrade did not complete");
                    return;
                }
            };

            let outcome = relay(TokioIo::new(client_io), TokioIo::new(remote_io)).await;
            metrics::record_relay_bytes("upstream", outcome.upstream_bytes);
            metrics::record_relay_bytes("downstream", outcome.downstream_bytes);
            match outcome.error {
                Some(err) => tracing::debug!(ended_by = ?outcome.ended_by, error = %err, "WebSocket relay failed"),
                None => tracing::debug!(ended_by = ?outcome.ended_by, "WebSocket relay closed"),
            }
        }
        .in_current_span(),
    );

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let handshake = response.headers_mut();
    handshake.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    handshake.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    handshake.insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(BARE_SUBPROTOCOL),
    );
    handshake.insert(SEC_WEBSOCKET_ACCEPT, accept);
    if let Some(extensions) = extensions {
        handshake.insert(SEC_WEBSOCKET_EXTENSIONS, extensions);
    }
    Ok(response)
}
