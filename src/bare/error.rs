//! Tunnel error taxonomy.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Everything that can go wrong while tunnelling a single request or socket.
///
/// On the request path each variant becomes a plain-text response with
/// [`TunnelError::status`]. On the upgrade path the connection is dropped
/// without writing anything.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Missing or malformed bare headers / subprotocol payload.
    #[error("malformed bare request: {0}")]
    Protocol(String),

    /// A bare header that must carry JSON did not.
    #[error("{field} is not valid JSON")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The path matched no route under the mount directory.
    #[error("no bare route for {0}")]
    NoRoute(String),

    /// Connect, DNS or TLS failure towards the remote.
    #[error("failed to reach remote {target}")]
    UpstreamConnect {
        target: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// The remote answered an upgrade attempt with something other than 101.
    #[error("remote did not upgrade the WebSocket (status {0})")]
    UpstreamRejectedUpgrade(StatusCode),

    /// The remote switched protocols but its handshake is unusable.
    #[error("remote WebSocket handshake is incomplete: {0}")]
    UpstreamHandshake(&'static str),

    /// A response body or header could not be serialized.
    #[error("failed to encode response")]
    Encode(#[from] serde_json::Error),

    /// Remote headers could not be carried in `x-bare-headers`.
    #[error("remote headers cannot be re-encoded")]
    HeaderEncode(#[from] axum::http::header::InvalidHeaderValue),

    /// hyper could not hand over an upgraded connection.
    #[error("connection upgrade failed")]
    Upgrade(#[from] hyper::Error),
}

impl TunnelError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Status used when the error is answered over HTTP.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Protocol(_) | Self::InvalidJson { .. } | Self::NoRoute(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UpstreamConnect { .. }
            | Self::UpstreamRejectedUpgrade(_)
            | Self::UpstreamHandshake(_) => StatusCode::BAD_GATEWAY,
            Self::Encode(_) | Self::HeaderEncode(_) | Self::Upgrade(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) | Self::InvalidJson { .. } => "protocol",
            Self::NoRoute(_) => "no_route",
            Self::UpstreamConnect { .. } => "upstream_connect",
            Self::UpstreamRejectedUpgrade(_) | Self::UpstreamHandshake(_) => "upstream_rejected",
            Self::Encode(_) | Self::HeaderEncode(_) => "encode",
            Self::Upgrade(_) => "upgrade",
        }
    }
}

impl IntoResponse for TunnelError {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.to_string()));
        *response.status_mut() = self.status();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
