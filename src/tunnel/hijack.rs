//! Taking a client connection away from the HTTP server.
//!
//! hyper attaches an upgrade handle to requests whose connection can be
//! handed over (HTTP/1 `CONNECT` served with upgrades enabled). [`Hijack`]
//! is that capability as a value: a request either yields one, or the
//! caller gets [`ProxyError::HijackUnsupported`].
//!
//! Taking the handle removes it from the request, so only one owner can ever
//! detach the connection, and the server stops framing it once the response
//! has been written.

use axum::http::Request;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;

use crate::http::ProxyError;

/// A client connection that the server has agreed to hand over.
#[derive(Debug)]
pub struct Hijack {
    on_upgrade: OnUpgrade,
}

/// A detached client connection as a raw duplex byte stream.
pub type Detached = TokioIo<Upgraded>;

impl Hijack {
    /// Take the hand-over capability out of `request`.
    pub fn take<B>(request: &mut Request<B>) -> Result<Self, ProxyError> {
        request
            .extensions_mut()
            .remove::<OnUpgrade>()
            .map(|on_upgrade| Self { on_upgrade })
            .ok_or(ProxyError::HijackUnsupported)
    }

    /// Wait for the server to flush the response and release the connection.
    ///
    /// Resolves only after the handler's response has been written, so the
    /// client always sees the full response head before any tunnel bytes.
    pub async fn detach(self) -> Result<Detached, ProxyError> {
        self.on_upgrade
            .await
            .map(TokioIo::new)
            .map_err(ProxyError::Hijack)
    }
}
