//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use forward_proxy::config::ProxyConfig;
use forward_proxy::net::Listener;
use forward_proxy::{HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A running proxy. Dropping it stops the accept loop.
pub struct TestProxy {
    pub addr: SocketAddr,
    _shutdown: Shutdown,
}

/// Start the proxy on an ephemeral loopback port.
pub async fn start_proxy() -> TestProxy {
    start_proxy_with(ProxyConfig::default()).await
}

pub async fn start_proxy_with(mut config: ProxyConfig) -> TestProxy {
    config.listener.bind_address = "127.0.0.1:0".into();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = HttpServer::new(config).run(listener, server_shutdown).await;
    });

    TestProxy {
        addr,
        _shutdown: shutdown,
    }
}

/// Address of a loopback port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// HTTP client that sends everything through the proxy.
#[allow(dead_code)]
pub fn proxied_client(proxy: &TestProxy) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{}", proxy.addr)).unwrap())
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

/// Read a request or response head, up to and including the blank line.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "stream closed mid-head: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Content-Length of a head, if present.
#[allow(dead_code)]
pub fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Start a backend that answers every request with a raw, fixed response.
#[allow(dead_code)]
pub async fn start_raw_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let mut body = vec![0u8; content_length(&head)];
                let _ = socket.read_exact(&mut body).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a backend that echoes the request head and body back as the body.
#[allow(dead_code)]
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let mut body = vec![0u8; content_length(&head)];
                let _ = socket.read_exact(&mut body).await;

                let mut echoed = head.into_bytes();
                echoed.extend_from_slice(&body);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    echoed.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&echoed).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Open a CONNECT tunnel through the proxy and return the stream with the
/// response head already consumed.
#[allow(dead_code)]
pub async fn connect_through(proxy: &TestProxy, target: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let head = tokio::time::timeout(Duration::from_secs(20), read_head(&mut stream))
        .await
        .expect("no CONNECT response");
    (stream, head)
}
