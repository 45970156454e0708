//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (HTTP/1.1 framing, upgrades enabled)
//!     → dispatch.rs (route on method)
//!         → connect.rs (CONNECT: dial, 200, detach → tunnel)
//!         → forward.rs (everything else: re-issue, relay response)
//!             → headers.rs (merge response headers)
//!     → error.rs (failures rendered as plain-text responses)
//! ```

pub mod connect;
pub mod dispatch;
pub mod error;
pub mod forward;
pub mod headers;
pub mod server;

pub use dispatch::{Dispatcher, ProxyState};
pub use error::ProxyError;
pub use headers::copy_headers;
pub use server::HttpServer;
