//! HTTP/HTTPS forward proxy library.
//!
//! Plain HTTP requests are re-issued to the destination named in their
//! target; `CONNECT host:port` requests become raw TCP tunnels.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod tunnel;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
