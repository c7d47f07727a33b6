//! Outbound HTTP(S) client shared by both tunnel paths.

use axum::body::Body;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

/// Client used for every outbound request and upgrade.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the outbound client.
///
/// `http:`/`ws:` targets go out in plaintext and `https:`/`wss:` over
/// rustls (ring provider, webpki roots). Only HTTP/1 is offered so upgrades
/// work. No `Host` header is synthesized: the remote sees exactly the
/// headers the bare client asked for.
pub fn build_client() -> Result<UpstreamClient, rustls::Error> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);

    let https = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Ok(Client::builder(TokioExecutor::new())
        .set_host(false)
        .build(https))
}
