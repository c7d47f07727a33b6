//! Bare protocol codec.
//!
//! # Data Flow
//! ```text
//! Inbound request headers (x-bare-host, x-bare-port, ..., x-bare-headers)
//!     → codec.rs (decode RemoteTarget + HeaderSet, apply forwarded headers)
//!     → tunnel layer (outbound request / upgrade)
//!
//! Outbound response headers
//!     → headers.rs (normalize order, group repeated names)
//!     → JSON in x-bare-headers / Meta Store entry
//!
//! Sec-WebSocket-Protocol: bare, <percent-encoded JSON>
//!     → codec.rs (split, namespace guard, percent-decode, parse)
//! ```
//!
//! # Design Decisions
//! - Control headers (`x-bare-*`) never end up in a decoded HeaderSet
//! - HeaderSet is an ordered container built fresh per request, with no
//!   implicit entries
//! - Remote fields that are absent stay absent; the tunnel refuses to guess

pub mod codec;
pub mod error;
pub mod headers;

pub use codec::{
    decode_percent, decode_remote_and_headers, decode_socket_protocol, load_forwarded_headers,
    RemoteTarget, SocketProtocolData,
};
pub use error::TunnelError;
pub use headers::{flatten, normalize_response_headers, BareHeaderValue, HeaderSet};
