//! Configuration types for cooldns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Record store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Update API configuration. `None` disables the HTTP listener.
    #[serde(default = "default_http")]
    pub http: Option<HttpConfig>,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    #[serde(default = "default_dns_listen")]
    pub listen_addr: SocketAddr,

    /// Zone served authoritatively (e.g., "ist.nicht.cool.").
    #[serde(default = "default_zone")]
    pub zone: String,

    /// TTL for DNS records in seconds.
    #[serde(default)]
    pub ttl: u32,

    /// Base64 TSIG secret. When set, every reply is signed with HMAC-SHA256
    /// under the zone name.
    #[serde(default)]
    pub tsig_key: Option<String>,
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

/// Update API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address for the HTTP update API.
    #[serde(default = "default_http_listen")]
    pub listen_addr: SocketAddr,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "cooldns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dns: DnsConfig::default(),
            store: StoreConfig::default(),
            http: default_http(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_dns_listen(),
            zone: default_zone(),
            ttl: 0,
            tsig_key: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_listen(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_dns_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8053))
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_http() -> Option<HttpConfig> {
    Some(HttpConfig::default())
}

fn default_zone() -> String {
    "ist.nicht.cool.".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("cool.db")
}

fn default_log_level() -> String {
    "info".to_string()
}
