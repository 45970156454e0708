//! Request dispatch.
//!
//! Every request parsed off a client connection enters here. `CONNECT` goes
//! to the tunnel handler; everything else goes through the forwarding router.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ProxyConfig, TimeoutConfig};
use crate::http::connect::handle_connect;
use crate::http::forward::forward_handler;
use crate::observability::metrics;

/// State shared by the handlers of every connection.
#[derive(Clone)]
pub struct ProxyState {
    /// Outbound client for forwarded requests.
    pub client: Client<HttpConnector, Body>,
    pub timeouts: TimeoutConfig,
}

impl ProxyState {
    pub fn new(config: &ProxyConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeouts.dial()));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .http1_preserve_header_case(true)
            .http1_title_case_headers(true)
            .http1_max_headers(config.limits.max_header_count())
            .build(connector);

        Self {
            client,
            timeouts: config.timeouts.clone(),
        }
    }
}

/// Routes each request to the CONNECT handler or the forwarding router.
#[derive(Clone)]
pub struct Dispatcher {
    state: ProxyState,
    forward: Router,
}

impl Dispatcher {
    pub fn new(config: &ProxyConfig) -> Self {
        let state = ProxyState::new(config);
        let forward = Self::build_forward_router(&config.timeouts, state.clone());
        Self { state, forward }
    }

    /// Build the router for non-CONNECT traffic.
    ///
    /// A fallback handler catches every path; the timeout bounds how long the
    /// client waits for a response head. A destination that misses it is an
    /// outbound failure, reported as 503.
    fn build_forward_router(timeouts: &TimeoutConfig, state: ProxyState) -> Router {
        Router::new()
            .fallback(forward_handler)
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::SERVICE_UNAVAILABLE,
                timeouts.write(),
            ))
            .layer(TraceLayer::new_for_http())
    }

    /// Handle one request from a client connection.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let (kind, response) = if *request.method() == Method::CONNECT {
            ("connect", handle_connect(&self.state, request).await)
        } else {
            let response = match self.forward.clone().oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            ("http", response)
        };

        metrics::record_request(kind, response.status().as_u16());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn closed_port() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn connect_goes_to_tunnel_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dispatcher = Dispatcher::new(&ProxyConfig::default());

        // Reachable destination, but a hand-built request has no connection
        // to take over: only the CONNECT path answers 500 here.
        let request = Request::builder()
            .method(Method::CONNECT)
            .uri(addr.to_string())
            .body(Body::empty())
            .unwrap();
        let response = dispatcher.handle(request).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn silent_destination_is_503_after_write_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = ProxyConfig::default();
        config.timeouts.write_secs = 1;
        let dispatcher = Dispatcher::new(&config);

        let request = Request::builder()
            .uri(format!("http://{}/", addr))
            .body(Body::empty())
            .unwrap();
        let response = tokio::time::timeout(Duration::from_secs(10), dispatcher.handle(request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn other_methods_are_forwarded() {
        let addr = closed_port().await;
        let dispatcher = Dispatcher::new(&ProxyConfig::default());

        for method in [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS] {
            let request = Request::builder()
                .method(method.clone())
                .uri(format!("http://{}/resource", addr))
                .body(Body::empty())
                .unwrap();
            let response = dispatcher.handle(request).await;
            assert_eq!(
                response.status(),
                StatusCode::SERVICE_UNAVAILABLE,
                "method {}",
                method
            );
        }
    }
}
