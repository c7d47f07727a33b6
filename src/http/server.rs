//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Build the bare router, meta store and outbound client
//! - Accept connections from the bounded listener
//! - Serve HTTP/1.1 (with upgrades) and HTTP/2 per connection
//! - Dispatch upgrades and plain requests to the router
//! - Stop accepting on shutdown and drain in-flight connections

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request};
use axum::response::Response;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::bare::TunnelError;
use crate::config::ProxyConfig;
use crate::http::request::is_upgrade_request;
use crate::http::response::{self, apply_default_headers, InvalidResponseHeader};
use crate::meta::MetaStore;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::routing::{bare_routes, BareRouter, RouterError};
use crate::tunnel::build_client;

/// Server construction or runtime failure.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    ResponseHeader(#[from] InvalidResponseHeader),
    #[error("failed to configure TLS: {0}")]
    Tls(#[from] rustls::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-request dispatch state, shared by every connection.
#[derive(Clone)]
struct Dispatcher {
    router: Arc<BareRouter>,
    default_headers: Arc<HeaderMap>,
}

impl Dispatcher {
    /// Upgrades go to the upgrade table and close the connection on any
    /// failure. Everything else gets a response.
    async fn dispatch(&self, request: Request<Body>) -> Result<Response, TunnelError> {
        if is_upgrade_request(&request) {
            let path = request.uri().path().to_string();
            return match self.router.route_upgrade(request).await {
                Some(Ok(response)) => Ok(response),
                Some(Err(err)) => {
                    tracing::warn!(path = %path, kind = err.kind(), error = %err, "Upgrade rejected, closing connection");
                    Err(err)
                }
                None => {
                    tracing::debug!(path = %path, "No upgrade route, closing connection");
                    Err(TunnelError::NoRoute(path))
                }
            };
        }

        let mut response = match self.router.route_request(request).await {
            Some(response) => response,
            None => response::bad_request(),
        };
        apply_default_headers(&mut response, &self.default_headers);
        Ok(response)
    }
}

/// HTTP server for the bare tunnel.
pub struct HttpServer {
    dispatcher: Dispatcher,
    meta: MetaStore,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let meta = MetaStore::new(config.bare.meta_ttl());
        let router = bare_routes(&config.bare.directory, build_client()?, meta.clone())?;
        let default_headers = response::default_headers(&config.bare.response_headers)?;

        Ok(Self {
            dispatcher: Dispatcher {
                router: Arc::new(router),
                default_headers: Arc::new(default_headers),
            },
            meta,
            config,
        })
    }

    /// The store backing `ws-new-meta` / `ws-meta`.
    pub fn meta_store(&self) -> &MetaStore {
        &self.meta
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            directory = %self.config.bare.directory,
            "HTTP server starting"
        );

        let sweeper = self
            .meta
            .start_sweeper(self.config.bare.sweep_interval(), shutdown.resubscribe());
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let guard = tracker.track();
                        let span = tracing::error_span!("conn", id = %guard.id(), peer = %peer_addr);
                        let dispatcher = self.dispatcher.clone();
                        let conn_shutdown = shutdown.resubscribe();
                        tokio::spawn(
                            async move {
                                serve_connection(stream, dispatcher, conn_shutdown).await;
                                drop(permit);
                                drop(guard);
                            }
                            .instrument(span),
                        );
                    }
                    Err(ListenerError::Closed) => break,
                    Err(err) => tracing::warn!(error = %err, "Accept failed"),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        let drain_timeout = self.config.listener.drain_timeout();
        if tokio::time::timeout(drain_timeout, tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = tracker.active_count(),
                timeout_secs = drain_timeout.as_secs(),
                "Drain timeout elapsed with connections still open"
            );
        }

        if let Err(err) = sweeper.await {
            tracing::warn!(error = %err, "Meta sweeper task failed");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Serve one connection. A service error drops the connection without a
/// response, which is how rejected upgrades are closed.
async fn serve_connection(
    stream: TcpStream,
    dispatcher: Dispatcher,
    mut shutdown: broadcast::Receiver<()>,
) {
    let service = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .service(tower::service_fn(move |request: Request<Incoming>| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch(request.map(Body::new)).await }
        }));

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder.http1().title_case_headers(true);
    let conn = builder.serve_connection_with_upgrades(
        TokioIo::new(stream),
        TowerToHyperService::new(service),
    );
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(err) = result {
                tracing::debug!(error = %err, "Connection closed with error");
            }
        }
        _ = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            if let Err(err) = conn.await {
                tracing::debug!(error = %err, "Connection closed with error during drain");
            }
        }
    }
}
