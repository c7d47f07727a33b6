//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper auto builder with upgrades, TraceLayer)
//!     → request.rs (upgrade or plain?)
//!     → routing (upgrade table / plain table)
//!     → response.rs (default CORS headers, empty 400 when unrouted)
//!     → Send to client, or drop the connection for failed upgrades
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::is_upgrade_request;
pub use server::{HttpServer, ServerError};
