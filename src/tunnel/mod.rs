//! Tunnel subsystem.
//!
//! # Data Flow
//! ```text
//! Plain request:
//!     bare headers → codec → outbound request (client.rs)
//!     → remote response → http.rs envelope (200 + x-bare-*) → browser
//!
//! Upgrade request:
//!     Sec-WebSocket-Protocol → codec → outbound upgrade (client.rs)
//!     → remote 101 → [meta attach] → 101 to browser
//!     → relay.rs copies bytes both ways until either side closes
//! ```
//!
//! # Design Decisions
//! - One shared client; connection pooling is the client's concern
//! - No retries and no timeouts beyond what the client applies
//! - The outbound leg is resolved before the browser sees a handshake

pub mod client;
pub mod http;
pub mod relay;
pub mod websocket;

pub use client::{build_client, UpstreamClient};
pub use http::tunnel_request;
pub use relay::{relay, RelayEnd, RelayOutcome};
pub use websocket::tunnel_socket;
