//! Decoding of bare request metadata.
//!
//! # Responsibilities
//! - Read the remote target from `x-bare-host/port/protocol/path`
//! - Parse the JSON header set from `x-bare-headers`
//! - Copy headers named in `x-bare-forward-headers` from the real request
//! - Decode the `Sec-WebSocket-Protocol` payload of socket tunnels

use std::fmt;

use axum::http::header::HeaderMap;
use axum::http::Uri;
use serde::{Deserialize, Deserializer, Serialize};

use crate::bare::error::TunnelError;
use crate::bare::headers::{flatten, is_control_header, BareHeaderValue, HeaderSet};

pub const X_BARE_HOST: &str = "x-bare-host";
pub const X_BARE_PORT: &str = "x-bare-port";
pub const X_BARE_PROTOCOL: &str = "x-bare-protocol";
pub const X_BARE_PATH: &str = "x-bare-path";
pub const X_BARE_HEADERS: &str = "x-bare-headers";
pub const X_BARE_FORWARD_HEADERS: &str = "x-bare-forward-headers";
pub const X_BARE_ID: &str = "x-bare-id";

/// Subprotocol namespace a socket tunnel must lead with.
pub const BARE_SUBPROTOCOL: &str = "bare";

/// Where the tunnel should connect. Fields the client left out stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "port_from_number_or_string")]
    pub port: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

fn port_from_number_or_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u64),
        Text(String),
    }

    Ok(Option::<Port>::deserialize(deserializer)?.map(|port| match port {
        Port::Number(n) => n.to_string(),
        Port::Text(s) => s,
    }))
}

impl RemoteTarget {
    fn require<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, TunnelError> {
        field
            .as_deref()
            .ok_or_else(|| TunnelError::protocol(format!("remote {name} is missing")))
    }

    /// Whether the connection must be wrapped in TLS.
    pub fn is_secure(&self) -> Result<bool, TunnelError> {
        match Self::require(&self.protocol, "protocol")? {
            "http:" | "ws:" => Ok(false),
            "https:" | "wss:" => Ok(true),
            other => Err(TunnelError::protocol(format!(
                "unsupported remote protocol {other:?}"
            ))),
        }
    }

    /// Absolute URI for the outbound request.
    pub fn to_uri(&self) -> Result<Uri, TunnelError> {
        let host = Self::require(&self.host, "host")?;
        let port = Self::require(&self.port, "port")?;
        let path = Self::require(&self.path, "path")?;
        let scheme = if self.is_secure()? { "https" } else { "http" };

        let port: u16 = port
            .parse()
            .map_err(|_| TunnelError::protocol(format!("invalid remote port {port:?}")))?;
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let path_and_query = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| TunnelError::protocol(format!("invalid remote target: {e}")))
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "?".into());
        write!(
            f,
            "{}//{}:{}{}",
            field(&self.protocol),
            field(&self.host),
            field(&self.port),
            field(&self.path)
        )
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, TunnelError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| TunnelError::protocol(format!("{name} is not valid text")))
        })
        .transpose()
}

fn parse_json<'a, T: Deserialize<'a>>(field: &'static str, text: &'a str) -> Result<T, TunnelError> {
    serde_json::from_str(text).map_err(|source| TunnelError::InvalidJson { field, source })
}

/// Recover the remote target and outbound header set from a tunnel request.
pub fn decode_remote_and_headers(
    headers: &HeaderMap,
) -> Result<(RemoteTarget, HeaderSet), TunnelError> {
    let text = |name| header_str(headers, name).map(|v| v.map(str::to_string));
    let remote = RemoteTarget {
        host: text(X_BARE_HOST)?,
        port: text(X_BARE_PORT)?,
        protocol: text(X_BARE_PROTOCOL)?,
        path: text(X_BARE_PATH)?,
    };

    let mut outbound = match header_str(headers, X_BARE_HEADERS)? {
        Some(json) => parse_json::<HeaderSet>(X_BARE_HEADERS, json)?,
        None => HeaderSet::new(),
    };

    if let Some(json) = header_str(headers, X_BARE_FORWARD_HEADERS)? {
        let forward: Vec<String> = parse_json(X_BARE_FORWARD_HEADERS, json)?;
        load_forwarded_headers(&forward, &mut outbound, headers);
    }

    let stripped = outbound.strip_control_headers();
    if stripped > 0 {
        tracing::debug!(stripped, "Dropped bare control headers from outbound set");
    }

    Ok((remote, outbound))
}

/// Copy each named header that is present on the real request into `target`,
/// overwriting what the client put in its JSON header set.
pub fn load_forwarded_headers(forward: &[String], target: &mut HeaderSet, source: &HeaderMap) {
    for name in forward {
        if is_control_header(name) {
            continue;
        }
        let values: Vec<String> = source
            .get_all(name.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        if !values.is_empty() {
            target.insert(name, flatten(&BareHeaderValue::Multiple(values)));
        }
    }
}

fn hex_digit(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Decode `%XX` triplets byte for byte. Everything else, including a `%` not
/// followed by two hex digits, passes through unchanged. Decoded bytes that
/// are not UTF-8 are a protocol error; nothing is substituted.
pub fn decode_percent(input: &str) -> Result<String, TunnelError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).copied().and_then(hex_digit);
            let lo = bytes.get(i + 2).copied().and_then(hex_digit);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out)
        .map_err(|_| TunnelError::protocol("percent-decoded payload is not valid UTF-8"))
}

/// JSON payload carried in the second subprotocol token.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketProtocolData {
    pub remote: RemoteTarget,
    #[serde(default)]
    pub headers: HeaderSet,
    #[serde(default)]
    pub forward_headers: Vec<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Validate and decode a `Sec-WebSocket-Protocol: bare, <payload>` value.
pub fn decode_socket_protocol(value: &str) -> Result<SocketProtocolData, TunnelError> {
    let tokens: Vec<&str> = value.split(',').map(str::trim_start).collect();
    let [first, data] = tokens.as_slice() else {
        return Err(TunnelError::protocol(format!(
            "expected 2 subprotocol tokens, got {}",
            tokens.len()
        )));
    };
    if *first != BARE_SUBPROTOCOL {
        return Err(TunnelError::protocol(format!(
            "first subprotocol must be {BARE_SUBPROTOCOL:?}"
        )));
    }

    let json = decode_percent(data)?;
    let mut payload: SocketProtocolData = serde_json::from_str(&json).map_err(|source| {
        TunnelError::InvalidJson {
            field: "sec-websocket-protocol",
            source,
        }
    })?;
    payload.headers.strip_control_headers();
    Ok(payload)
}
