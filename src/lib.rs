//! Bare protocol tunnelling server library.

pub mod bare;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod meta;
pub mod net;
pub mod observability;
pub mod routing;
pub mod tunnel;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
