//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path under the mount directory)
//!     → router.rs (strip mount, exact lookup)
//!     → plain table   → handler → Response (errors rendered as responses)
//!     → upgrade table → handler → Result (errors close the connection)
//!     → no match      → None (caller answers 400 or closes)
//!
//! Registration (at startup, routes.rs):
//!     /             → HTTP tunnel
//!     /ws-new-meta  → meta create
//!     /ws-meta      → meta consume
//!     / (upgrade)   → WebSocket tunnel
//! ```
//!
//! # Design Decisions
//! - Routes registered once at startup, immutable at runtime
//! - Exact string keys; no patterns or prefixes beyond the mount
//! - Explicit no-match rather than a silent default

pub mod router;
pub mod routes;

pub use router::{BareRouter, Handler, HandlerFuture, RouterError};
pub use routes::bare_routes;
