//! Meta handshake subsystem.
//!
//! # Data Flow
//! ```text
//! GET {mount}ws-new-meta  → store.create()            → id (hex)
//! socket tunnel with id   → store.attach_response()   → remote 101 headers kept
//! GET {mount}ws-meta      → store.consume()           → {"headers": ...}, entry gone
//!
//! Sweeper (every sweep interval):
//!     drop entries older than the TTL, consumed or not
//! ```
//!
//! # Design Decisions
//! - IDs come from the OS CSPRNG
//! - Entries are read-once; a consumed ID never reappears
//! - Late attaches to expired IDs are silently dropped

pub mod handlers;
pub mod store;

pub use store::{MetaEntry, MetaResponse, MetaStore, DEFAULT_META_TTL, META_ID_BYTES};
