//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound destination dials with the configured connect timeout
//! - Bound outbound forward exchanges when a deadline is configured
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out operations are abandoned, never retried

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;

use crate::http::ProxyError;

/// Open a TCP connection to `target` (`host:port`), giving up after `timeout`.
pub async fn dial(target: &str, timeout: Duration) -> Result<TcpStream, ProxyError> {
    match time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(source)) => Err(ProxyError::Dial {
            target: target.to_string(),
            source,
        }),
        Err(_) => Err(ProxyError::DialTimeout {
            target: target.to_string(),
            timeout,
        }),
    }
}

/// Await `exchange`, failing with [`ProxyError::UpstreamTimeout`] once
/// `deadline` passes. Without a deadline the exchange runs unbounded.
pub async fn with_deadline<F, T>(deadline: Option<Duration>, exchange: F) -> Result<T, ProxyError>
where
    F: Future<Output = Result<T, ProxyError>>,
{
    match deadline {
        Some(limit) => time::timeout(limit, exchange)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(limit))?,
        None => exchange.await,
    }
}
