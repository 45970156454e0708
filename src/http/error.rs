//! Per-request proxy errors and their HTTP rendering.
//!
//! Every failure a handler can hit is reported to the client as a plain-text
//! response carrying the underlying error text. None of these errors escape
//! the connection task that produced them.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised while handling a single proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request target names no usable destination.
    #[error("invalid proxy target: {0}")]
    InvalidTarget(String),

    /// A forwarded request arrived in origin-form, naming no destination.
    #[error("upstream request failed: no host in request URL {0}")]
    NoHost(String),

    /// TCP connect to the destination failed (refused, unreachable, DNS).
    #[error("dial {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// TCP connect to the destination did not finish in time.
    #[error("dial {target}: i/o timeout after {timeout:?}")]
    DialTimeout { target: String, timeout: Duration },

    /// The client connection cannot be taken over by the handler.
    #[error("hijacking not supported")]
    HijackUnsupported,

    /// Taking over the client connection failed.
    #[error("hijack failed: {0}")]
    Hijack(#[source] hyper::Error),

    /// The outbound HTTP exchange failed.
    #[error("upstream request failed: {}", error_chain(.0))]
    Upstream(#[source] hyper_util::client::legacy::Error),

    /// The outbound HTTP exchange exceeded its deadline.
    #[error("upstream request timed out after {0:?}")]
    UpstreamTimeout(Duration),
}

impl ProxyError {
    /// Status code reported to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::HijackUnsupported => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::NoHost(_)
            | ProxyError::Dial { .. }
            | ProxyError::DialTimeout { .. }
            | ProxyError::Hijack(_)
            | ProxyError::Upstream(_)
            | ProxyError::UpstreamTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, format!("{}\n", self)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        response
    }
}

/// Render an error followed by each of its sources, colon separated.
///
/// The outbound client's top-level errors are terse ("client error (Connect)");
/// the useful detail lives further down the chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
