//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Accept client connections from the bounded listener
//! - Serve each connection with HTTP/1.1, upgrades enabled for `CONNECT`
//! - Apply connection-level limits (header read timeout, head size)
//! - Hand every parsed request to the dispatcher
//! - Stop accepting when shutdown is signalled

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Body;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::http::dispatch::Dispatcher;
use crate::net::{ConnectionPermit, ConnectionTracker, Listener, ListenerError};

/// HTTP server for the forward proxy.
pub struct HttpServer {
    dispatcher: Dispatcher,
    connection: http1::Builder,
    tracker: ConnectionTracker,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let dispatcher = Dispatcher::new(&config);
        let connection = Self::build_connection(&config);
        Self {
            dispatcher,
            connection,
            tracker: ConnectionTracker::new(),
            config,
        }
    }

    /// Per-connection HTTP/1 settings.
    ///
    /// A head over `max_header_bytes` is answered with 431. Header names
    /// keep the casing they arrived with; title case is only the fallback.
    fn build_connection(config: &ProxyConfig) -> http1::Builder {
        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(config.timeouts.read())
            .max_header_size(config.limits.max_header_bytes)
            .max_headers(config.limits.max_header_count())
            .max_buf_size(config.limits.read_buffer_bytes())
            .preserve_header_case(true)
            .title_case_headers(true);
        builder
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    ///
    /// Connections and tunnels already in flight are left to finish on
    /// their own.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Proxy server starting");
        }

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            };

            match accepted {
                Ok((stream, peer_addr, permit)) => self.serve(stream, peer_addr, permit),
                Err(e) => match e.retry_delay() {
                    Some(delay) if delay.is_zero() => {
                        tracing::debug!(error = %e, "Accept failed");
                    }
                    Some(delay) => {
                        tracing::error!(error = %e, retry_in = ?delay, "Accept failed, backing off");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown.recv() => {
                                tracing::info!("Shutdown signal received, no longer accepting connections");
                                break;
                            }
                        }
                    }
                    None => {
                        tracing::error!(error = %e, "Listener failed");
                        return Err(e);
                    }
                },
            }
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Proxy server stopped"
        );
        Ok(())
    }

    /// Serve one client connection on its own task.
    fn serve(&self, stream: TcpStream, peer_addr: SocketAddr, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let dispatcher = self.dispatcher.clone();
        let connection = self.connection.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let connection_id = guard.id();
            tracing::debug!(
                connection_id = %connection_id,
                peer_addr = %peer_addr,
                "Serving connection"
            );

            let service = service_fn(move |request: Request<Incoming>| {
                let dispatcher = dispatcher.clone();
                async move { Ok::<_, Infallible>(dispatcher.handle(request.map(Body::new)).await) }
            });

            // Resolves early when a CONNECT takes the connection over.
            if let Err(e) = connection
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades()
                .await
            {
                tracing::debug!(connection_id = %connection_id, error = %e, "Connection error");
            }

            drop(guard);
        });
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Number of client connections currently being served.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}
