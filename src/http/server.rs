//! HTTP server implementation.

use std::net::SocketAddr;
use axum::Router;
use tracing::{error, info};

use crate::error::Result;

/// HTTP server for the throttled application routes.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The routes to serve
    router: Router,
}

impl HttpServer {
    /// Create a new server for `router`.
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self { addr, router }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves. Peer
    /// addresses are recorded per connection so requests can be throttled by
    /// client address.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            e.into()
        })
    }
}
