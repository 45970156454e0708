//! `CONNECT` handling.
//!
//! # Responsibilities
//! - Dial the requested `host:port` with the configured timeout
//! - Answer 200 once the destination is reachable
//! - Detach the client connection and splice it to the destination
//!
//! # Design Decisions
//! - The hand-over capability is checked before answering, so an
//!   unsupported connection still gets a real 500
//! - Detaching completes only after hyper has flushed the 200, so tunnel
//!   bytes never precede the response head
//! - The handler returns as soon as the 200 is ready; the tunnel outlives it

use axum::{
    body::Body,
    http::{Request, Uri},
    response::{IntoResponse, Response},
};

use crate::http::dispatch::ProxyState;
use crate::http::ProxyError;
use crate::resilience::dial;
use crate::tunnel::{self, Hijack};

/// Handle a `CONNECT host:port` request.
pub async fn handle_connect(state: &ProxyState, mut request: Request<Body>) -> Response {
    tracing::info!(uri = %request.uri(), "CONNECT handler");

    match open_tunnel(state, &mut request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(uri = %request.uri(), error = %e, "CONNECT failed");
            e.into_response()
        }
    }
}

async fn open_tunnel(state: &ProxyState, request: &mut Request<Body>) -> Result<Response, ProxyError> {
    let target = connect_target(request.uri())?;
    let upstream = dial(&target, state.timeouts.dial()).await?;

    // On error the destination stream is dropped here, closing it.
    let hijack = Hijack::take(request)?;

    tokio::spawn(async move {
        match hijack.detach().await {
            Ok(client) => tunnel::spawn(client, upstream, target),
            Err(e) => {
                // The 200 is already committed; all that is left is to
                // release the destination.
                tracing::warn!(
                    destination = %target,
                    error = %e,
                    "Client connection could not be detached, closing destination"
                );
            }
        }
    });

    Ok(Response::new(Body::empty()))
}

/// Extract the `host:port` a CONNECT request asks for.
pub fn connect_target(uri: &Uri) -> Result<String, ProxyError> {
    uri.authority()
        .map(|authority| authority.to_string())
        .ok_or_else(|| ProxyError::InvalidTarget(uri.to_string()))
}
