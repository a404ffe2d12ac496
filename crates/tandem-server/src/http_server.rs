//! HTTP Server
//!
//! Exposes the procedure registry over a single batched endpoint using axum.
//!
//! # Architecture
//!
//! - `POST {endpoint}` (default `/api/rpc`) accepts one call or an array of
//!   calls and answers with an array of outcomes in the same order
//! - `GET /__health` is a liveness probe that never touches the registry
//! - Bodies above the configured limit are answered with 413 before parsing
//! - CORS is permissive; browsers call the endpoint from the rendered page
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_server::app::app_registry;
//! use tandem_server::config::ServerConfig;
//! use tandem_server::http_server::HttpServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::from_env().unwrap();
//!     let registry = Arc::new(app_registry().unwrap());
//!     let server = HttpServer::new(registry, &config);
//!     server.run(config.bind).await.unwrap();
//! }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::body::Bytes;
use hyper::header::AUTHORIZATION;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use tandem_common::auth::{extract_credential, API_KEY_HEADER};
use tandem_common::protocol::{ErrorBody, Result, TandemError};
use tandem_common::transport::HttpTransport;

use crate::config::ServerConfig;
use crate::http_router::BatchRouter;
use crate::registry::Registry;

#[derive(Clone)]
struct ServerState {
    router: Arc<BatchRouter>,
    max_body_bytes: usize,
}

/// HTTP server for a procedure registry.
pub struct HttpServer {
    state: ServerState,
    endpoint: String,
}

impl HttpServer {
    /// Creates a server for `registry` using the endpoint, body limit and
    /// context settings of `config`.
    pub fn new(registry: Arc<Registry>, config: &ServerConfig) -> Self {
        let router = BatchRouter::new(registry, config.context_factory());
        Self::with_router(router, config.endpoint.clone(), config.max_body_bytes)
    }

    pub fn with_router(router: BatchRouter, endpoint: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            state: ServerState {
                router: Arc::new(router),
                max_body_bytes,
            },
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The axum application, for embedding into a larger router.
    pub fn app(&self) -> axum::Router {
        axum::Router::new()
            .route(&self.endpoint, axum::routing::post(handle_batch))
            .route("/__health", axum::routing::get(health_check))
            .layer(DefaultBodyLimit::max(self.state.max_body_bytes))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Binds `addr` and serves until the process exits.
    ///
    /// # Returns
    /// - `Err(TandemError::Transport)` - Binding failed or the server stopped
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serves on `listener` until `shutdown` resolves, then drains in-flight
    /// requests.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|e| TandemError::Transport(format!("Failed to get local addr: {}", e)))?;
        info!(
            "Tandem HTTP server listening on http://{}{} ({} procedures)",
            local,
            self.endpoint,
            self.state.router.registry().len()
        );

        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| TandemError::Transport(format!("Server error: {}", e)))?;

        info!("Tandem HTTP server stopped");
        Ok(())
    }
}

/// Binds a TCP listener, mapping failures to transport errors.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| TandemError::Transport(format!("Failed to bind to {}: {}", addr, e)))
}

async fn handle_batch(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) if body.len() <= state.max_body_bytes => body,
        Ok(_) => return HttpTransport::to_http_error(ErrorBody::payload_too_large(state.max_body_bytes)).into_response(),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            tracing::warn!("Rejected oversized request body");
            return HttpTransport::to_http_error(ErrorBody::payload_too_large(state.max_body_bytes)).into_response();
        }
        Err(rejection) => {
            tracing::error!("Failed to read request body: {}", rejection.body_text());
            return HttpTransport::to_http_error(ErrorBody::parse_error(&rejection.body_text())).into_response();
        }
    };

    let calls = match HttpTransport::parse_batch(body) {
        Ok(calls) => calls,
        Err(e) => {
            tracing::debug!("Malformed batch: {}", e);
            return HttpTransport::to_http_error(ErrorBody::parse_error(&e.to_string())).into_response();
        }
    };

    let api_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let credential = extract_credential(api_key, authorization);

    let responses = state.router.handle_batch(calls, credential).await;
    HttpTransport::to_http_response(responses).into_response()
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::app_registry;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_server_uses_configured_endpoint() {
        let config = ServerConfig::default().with_endpoint("/trpc").unwrap();
        let server = HttpServer::new(Arc::new(app_registry().unwrap()), &config);
        assert_eq!(server.endpoint(), "/trpc");
        assert_eq!(server.state.max_body_bytes, config.max_body_bytes);
    }
}
