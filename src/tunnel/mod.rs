//! Raw TCP tunnels for `CONNECT` sessions.
//!
//! # Data Flow
//! ```text
//! Client ── detached HTTP conn ──▶ relay (upstream) ──▶ Destination
//! Client ◀── detached HTTP conn ── relay (downstream) ◀── Destination
//! ```
//!
//! # Design Decisions
//! - Two independently spawned tasks per tunnel, never joined by the handler
//! - Bytes are copied opaquely; nothing inside the tunnel is inspected
//! - Either direction ending closes both connections via a shared teardown
//!   signal; errors are logged, never propagated

pub mod hijack;
pub mod relay;

use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::observability::metrics;

pub use hijack::{Detached, Hijack};
pub use relay::{relay, RelayEnd, Teardown};

/// Direction of travel through a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to destination.
    Upstream,
    /// Destination to client.
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

/// Lifetime marker for one tunnel, shared by its two relay tasks.
///
/// Dropped when the second direction finishes.
#[derive(Debug)]
struct TunnelSession {
    target: String,
    opened: Instant,
}

impl TunnelSession {
    fn open(target: String) -> Self {
        metrics::tunnel_opened();
        tracing::debug!(destination = %target, "Tunnel established");
        Self {
            target,
            opened: Instant::now(),
        }
    }

    fn finish(&self, direction: Direction, end: RelayEnd) {
        metrics::record_tunnel_bytes(direction.as_str(), end.bytes());
        match end {
            RelayEnd::Eof(bytes) => {
                tracing::debug!(
                    destination = %self.target,
                    direction = direction.as_str(),
                    bytes,
                    "Tunnel direction reached end of stream"
                );
            }
            RelayEnd::Failed { bytes, error } => {
                tracing::debug!(
                    destination = %self.target,
                    direction = direction.as_str(),
                    bytes,
                    error = %error,
                    "Tunnel direction failed"
                );
            }
            RelayEnd::PeerClosed(bytes) => {
                tracing::debug!(
                    destination = %self.target,
                    direction = direction.as_str(),
                    bytes,
                    "Tunnel direction stopped by peer"
                );
            }
        }
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        metrics::tunnel_closed();
        tracing::debug!(
            destination = %self.target,
            duration_ms = self.opened.elapsed().as_millis() as u64,
            "Tunnel closed"
        );
    }
}

/// Splice `client` and `upstream` together and return immediately.
///
/// The tunnel lives on in two spawned tasks, one per direction, until either
/// side closes or fails; both connections are then closed.
pub fn spawn<C, U>(client: C, upstream: U, target: String)
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = tokio::io::split(upstream);

    let session = Arc::new(TunnelSession::open(target));
    let teardown = Teardown::new();

    {
        let session = Arc::clone(&session);
        let teardown = teardown.clone();
        tokio::spawn(async move {
            let end = relay(upstream_write, client_read, teardown).await;
            session.finish(Direction::Upstream, end);
        });
    }

    tokio::spawn(async move {
        let end = relay(client_write, upstream_read, teardown).await;
        session.finish(Direction::Downstream, end);
    });
}
