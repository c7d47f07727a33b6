//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Hold the plain and upgrade route tables for one mount directory
//! - Strip the mount prefix and look up the exact remaining path
//! - Return an explicit no-match so the caller decides what to send
//!
//! # Design Decisions
//! - Immutable after construction (shared via `Arc`, no locks)
//! - O(1) exact lookup via HashMap, no patterns
//! - Handler errors on the plain table become responses here; on the
//!   upgrade table they are returned so the connection can be dropped

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;

use crate::bare::TunnelError;

/// Future returned by a registered handler.
pub type HandlerFuture = BoxFuture<'static, Result<Response, TunnelError>>;

/// A registered handler.
pub type Handler = Arc<dyn Fn(Request<Body>) -> HandlerFuture + Send + Sync>;

/// Invalid router construction.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("mount directory must start and end with '/': {0:?}")]
    InvalidDirectory(String),
}

/// Two exact-path route tables under a mount directory.
pub struct BareRouter {
    directory: String,
    routes: HashMap<String, Handler>,
    socket_routes: HashMap<String, Handler>,
}

impl std::fmt::Debug for BareRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BareRouter")
            .field("directory", &self.directory)
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("socket_routes", &self.socket_routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BareRouter {
    /// Create an empty router mounted at `directory` (e.g. `/bare/`).
    pub fn new(directory: impl Into<String>) -> Result<Self, RouterError> {
        let directory = directory.into();
        if !directory.starts_with('/') || !directory.ends_with('/') {
            return Err(RouterError::InvalidDirectory(directory));
        }
        Ok(Self {
            directory,
            routes: HashMap::new(),
            socket_routes: HashMap::new(),
        })
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Register a plain handler for `path` relative to the mount directory.
    pub fn route<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, TunnelError>> + Send + 'static,
    {
        self.routes.insert(path.to_string(), boxed(handler));
        self
    }

    /// Register an upgrade handler for `path` relative to the mount directory.
    pub fn socket_route<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, TunnelError>> + Send + 'static,
    {
        self.socket_routes.insert(path.to_string(), boxed(handler));
        self
    }

    /// Path relative to the mount directory, keeping its leading `/`.
    ///
    /// `/bare/ws-meta` under `/bare/` is `/ws-meta`. Paths outside the mount
    /// return `None`.
    pub fn service_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        if !path.starts_with(&self.directory) {
            return None;
        }
        path.get(self.directory.len() - 1..)
    }

    fn lookup<'t>(&self, table: &'t HashMap<String, Handler>, request: &Request<Body>) -> Option<&'t Handler> {
        self.service_path(request.uri().path())
            .and_then(|path| table.get(path))
    }

    /// Dispatch a plain request. `None` when no route matches.
    pub async fn route_request(&self, request: Request<Body>) -> Option<Response> {
        let handler = self.lookup(&self.routes, &request)?;
        let path = request.uri().path().to_string();
        match handler(request).await {
            Ok(response) => Some(response),
            Err(err) => {
                tracing::warn!(path = %path, status = %err.status(), error = %err, "Bare request failed");
                Some(err.into_response())
            }
        }
    }

    /// Dispatch an upgrade request. `None` when no route matches; the caller
    /// closes the connection.
    pub async fn route_upgrade(&self, request: Request<Body>) -> Option<Result<Response, TunnelError>> {
        let handler = self.lookup(&self.socket_routes, &request)?;
        Some(handler(request).await)
    }
}

fn boxed<F, Fut>(handler: F) -> Handler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, TunnelError>> + Send + 'static,
{
    Arc::new(move |request| handler(request).boxed())
}
