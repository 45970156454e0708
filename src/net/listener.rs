//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Pause before accepting again after a resource error such as running out
/// of file descriptors.
pub const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),
    /// The connection limiter was closed.
    #[error("Connection limiter closed")]
    Closed,
}

impl ListenerError {
    /// Accept errors caused by a single misbehaving peer rather than the
    /// listening socket itself.
    pub fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            ListenerError::Accept(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionReset
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// How long the accept loop waits before trying again, or `None` when
    /// the listener can no longer accept at all.
    ///
    /// Peer errors are retried at once. Every other accept error (`EMFILE`,
    /// `ENFILE`, `ENOBUFS`, ...) is retried after [`ACCEPT_BACKOFF`], giving
    /// open connections time to release descriptors.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            ListenerError::Accept(_) if self.is_transient() => Some(Duration::ZERO),
            ListenerError::Accept(_) => Some(ACCEPT_BACKOFF),
            ListenerError::Bind { .. } | ListenerError::Closed => None,
        }
    }
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            address: config.bind_address.clone(),
            source,
        };

        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            bind_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        let _ = stream.set_nodelay(true);

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            max_connections,
        }
    }

    #[tokio::test]
    async fn accept_holds_permit_until_dropped() {
        let listener = Listener::bind(&local_config(2)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(listener.max_connections(), 2);

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _peer, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }

    #[tokio::test]
    async fn bind_rejects_unparseable_address() {
        let config = ListenerConfig {
            bind_address: "localhost:http".into(),
            max_connections: 1,
        };
        let err = Listener::bind(&config).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert!(err.to_string().contains("localhost:http"));
    }

    #[test]
    fn transient_accept_errors() {
        let aborted = ListenerError::Accept(std::io::ErrorKind::ConnectionAborted.into());
        assert!(aborted.is_transient());
        let fatal = ListenerError::Accept(std::io::ErrorKind::PermissionDenied.into());
        assert!(!fatal.is_transient());
        assert!(!ListenerError::Closed.is_transient());
    }

    #[test]
    fn descriptor_exhaustion_is_retried_after_backoff() {
        // EMFILE and ENFILE.
        for code in [24, 23] {
            let err = ListenerError::Accept(std::io::Error::from_raw_os_error(code));
            assert!(!err.is_transient());
            assert_eq!(err.retry_delay(), Some(ACCEPT_BACKOFF));
        }

        let reset = ListenerError::Accept(std::io::ErrorKind::ConnectionReset.into());
        assert_eq!(reset.retry_delay(), Some(Duration::ZERO));
        assert_eq!(ListenerError::Closed.retry_delay(), None);
    }
}
