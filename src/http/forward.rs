//! Plain HTTP forwarding.
//!
//! # Responsibilities
//! - Re-issue a non-CONNECT request to the destination named by its target
//! - Copy status and every response header back to the client
//! - Stream the response body without buffering
//!
//! # Design Decisions
//! - Method, target, headers and body pass through unchanged
//! - Only absolute-form targets are forwarded; an origin-form target is
//!   refused with 503 instead of being aimed at `Host`, which may name the
//!   proxy itself
//! - Upstream extensions travel with the response, so hyper writes header
//!   names in the casing the destination used
//! - Transport failures become 503 with the error text; never retried

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
};

use crate::http::dispatch::ProxyState;
use crate::http::headers::copy_headers;
use crate::http::ProxyError;
use crate::resilience::with_deadline;

/// Router fallback that forwards every request it receives.
pub async fn forward_handler(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    tracing::info!(method = %request.method(), uri = %request.uri(), "HTTP handler");

    match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Forwarding failed");
            e.into_response()
        }
    }
}

/// Send `request` to its destination and relay the response.
pub async fn forward(state: &ProxyState, request: Request<Body>) -> Result<Response, ProxyError> {
    require_absolute_target(&request)?;

    let exchange = async {
        state
            .client
            .request(request)
            .await
            .map_err(ProxyError::Upstream)
    };
    let upstream = with_deadline(state.timeouts.forward(), exchange).await?;

    let (parts, body) = upstream.into_parts();
    // The upstream body is dropped, releasing its connection, once the client
    // has read it to the end or gone away.
    let mut response = Response::new(Body::new(body));
    *response.status_mut() = parts.status;
    copy_headers(response.headers_mut(), &parts.headers);
    *response.extensions_mut() = parts.extensions;

    Ok(response)
}

/// Make sure the request target names its destination.
///
/// Proxy clients send absolute-form targets (`GET http://host/path`). An
/// origin-form target carries no destination of its own.
pub fn require_absolute_target(request: &Request<Body>) -> Result<(), ProxyError> {
    match request.uri().authority() {
        Some(_) => Ok(()),
        None => Err(ProxyError::NoHost(request.uri().to_string())),
    }
}
