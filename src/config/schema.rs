//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default listening port when neither the config file nor the CLI names one.
pub const DEFAULT_PORT: u16 = 8080;

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Protocol limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// Replace the port of the bind address, keeping its host part.
    ///
    /// Falls back to the wildcard address when the current bind address
    /// does not parse.
    pub fn set_port(&mut self, port: u16) {
        let mut addr: SocketAddr = self
            .bind_address
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));
        addr.set_port(port);
        self.bind_address = addr.to_string();
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{}", DEFAULT_PORT),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Destination dial timeout in seconds (CONNECT and forwarded requests).
    pub dial_secs: u64,

    /// Time allowed for a client to send a full request head, in seconds.
    pub read_secs: u64,

    /// Time allowed to produce a response for a forwarded request, in seconds.
    pub write_secs: u64,

    /// Optional deadline on the outbound exchange of a forwarded request.
    pub forward_secs: Option<u64>,
}

impl TimeoutConfig {
    pub fn dial(&self) -> Duration {
        Duration::from_secs(self.dial_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn forward(&self) -> Option<Duration> {
        self.forward_secs.map(Duration::from_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dial_secs: 15,
            read_secs: 15,
            write_secs: 15,
            forward_secs: None,
        }
    }
}

/// HTTP protocol limits for client connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a request head (request line plus headers) in bytes.
    pub max_header_bytes: usize,
}

/// Average header line length assumed when sizing the header count limit.
const HEADER_LINE_ESTIMATE: usize = 64;

/// hyper's own default header count.
const MIN_HEADER_COUNT: usize = 100;

impl LimitsConfig {
    /// Maximum number of header lines in a request or response head.
    ///
    /// hyper caps the count separately from the byte size; the cap follows
    /// `max_header_bytes` so the byte limit stays the one that binds in
    /// practice.
    pub fn max_header_count(&self) -> usize {
        (self.max_header_bytes / HEADER_LINE_ESTIMATE).max(MIN_HEADER_COUNT)
    }

    /// Read buffer size for client connections.
    ///
    /// Leaves room past the head limit so an oversized but complete head is
    /// read in full and answered with 431.
    pub fn read_buffer_bytes(&self) -> usize {
        self.max_header_bytes.saturating_add(8 * 1024)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 1 << 20,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.timeouts.dial(), Duration::from_secs(15));
        assert_eq!(config.timeouts.read(), Duration::from_secs(15));
        assert_eq!(config.timeouts.write(), Duration::from_secs(15));
        assert_eq!(config.timeouts.forward(), None);
        assert_eq!(config.limits.max_header_bytes, 1024 * 1024);
    }

    #[test]
    fn header_count_follows_byte_limit() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.max_header_count(), 16_384);

        let small = LimitsConfig {
            max_header_bytes: 8 * 1024,
        };
        assert_eq!(small.max_header_count(), 128);
        assert_eq!(small.read_buffer_bytes(), 16 * 1024);

        let tiny = LimitsConfig {
            max_header_bytes: 1024,
        };
        assert_eq!(tiny.max_header_count(), 100);
    }

    #[test]
    fn set_port_keeps_host() {
        let mut listener = ListenerConfig {
            bind_address: "127.0.0.1:8080".into(),
            max_connections: 1,
        };
        listener.set_port(3128);
        assert_eq!(listener.bind_address, "127.0.0.1:3128");
    }

    #[test]
    fn set_port_recovers_from_bad_address() {
        let mut listener = ListenerConfig {
            bind_address: "not-an-address".into(),
            max_connections: 1,
        };
        listener.set_port(9000);
        assert_eq!(listener.bind_address, "0.0.0.0:9000");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [timeouts]
            dial_secs = 3
            forward_secs = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.timeouts.dial_secs, 3);
        assert_eq!(config.timeouts.forward(), Some(Duration::from_secs(20)));
        assert_eq!(config.timeouts.read_secs, 15);
        assert_eq!(config.listener.max_connections, 10_000);
    }
}
