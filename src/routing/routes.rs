//! Static route registration for the bare v1 surface.

use crate::meta::handlers::{fetch_meta, new_meta};
use crate::meta::MetaStore;
use crate::routing::router::{BareRouter, RouterError};
use crate::tunnel::{tunnel_request, tunnel_socket, UpstreamClient};

/// Build the router serving `{directory}`, `{directory}ws-new-meta`,
/// `{directory}ws-meta` and the WebSocket upgrade at `{directory}`.
pub fn bare_routes(
    directory: &str,
    client: UpstreamClient,
    meta: MetaStore,
) -> Result<BareRouter, RouterError> {
    let mut router = BareRouter::new(directory)?;

    let http_client = client.clone();
    router.route("/", move |request| tunnel_request(http_client.clone(), request));

    let store = meta.clone();
    router.route("/ws-new-meta", move |request| new_meta(store.clone(), request));

    let store = meta.clone();
    router.route("/ws-meta", move |request| fetch_meta(store.clone(), request));

    router.socket_route("/", move |request| {
        tunnel_socket(client.clone(), meta.clone(), request)
    });

    tracing::debug!(directory = %router.directory(), "Bare routes registered");
    Ok(router)
}
