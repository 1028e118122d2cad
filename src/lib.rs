//! CoolDNS - a self-hosted dynamic DNS service.
//!
//! This crate provides an authoritative DNS server for a single zone whose
//! records are owned by registered hostnames. Owners keep their addresses
//! current through a small dyndns2-style HTTP API; every answer is served from
//! an in-memory directory that is persisted to SQLite.
//!
//! ## Features
//!
//! - A, AAAA, TXT, MX and CNAME answers, authoritative only
//! - Optional TSIG (HMAC-SHA256) signing of every reply
//! - scrypt-derived credentials compared in constant time
//! - Records survive restarts; offline hosts stop resolving
//! - Graceful shutdown support
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            cooldns                               │
//! │                                                                  │
//! │  ┌──────────────────┐    ┌──────────────────┐                    │
//! │  │  Update API      │───▶│  Record Store    │──▶ SQLite          │
//! │  │  /nic/update     │    │  (write path)    │                    │
//! │  └──────────────────┘    └────────┬─────────┘                    │
//! │                                   │                              │
//! │                                   ▼                              │
//! │                          ┌──────────────────┐                    │
//! │                          │   Directory      │                    │
//! │                          │   (in-memory)    │                    │
//! │                          └────────┬─────────┘                    │
//! │                                   ▼                              │
//! │                          ┌──────────────────┐                    │
//! │                          │  Zone Authority  │◀── UDP/TCP         │
//! │                          │  (+ TSIG)        │                    │
//! │                          └──────────────────┘                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! home.ist.nicht.cool. AAAA
//!   → normalize (lowercase, punycode → unicode)
//!   → lookup record in the directory
//!   → CNAME set? answer the CNAME only
//!   → otherwise one record per stored address of the requested type
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use cooldns::{Directory, DnsConfig, DnsServer, DurableStore, RecordStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let directory = Directory::new();
//!     let store = DurableStore::open("cool.db", directory.clone()).unwrap();
//!
//!     let config = DnsConfig {
//!         listen_addr: "[::]:5353".parse().unwrap(),
//!         ..DnsConfig::default()
//!     };
//!
//!     let shutdown = CancellationToken::new();
//!     let server = DnsServer::bind(&config, directory).await.unwrap();
//!     server.run(shutdown).await.unwrap();
//!     store.close().unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod authority;
pub mod config;
pub mod error;
pub mod metrics;
pub mod record;
pub mod server;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod tsig;
pub mod update;

// Re-export main types
pub use auth::Credential;
pub use authority::ZoneAuthority;
pub use config::{Config, DnsConfig, HttpConfig, StoreConfig, TelemetryConfig};
pub use error::CoolDnsError;
pub use record::{DomainRecord, MxEntry};
pub use server::DnsServer;
pub use state::Directory;
pub use store::{DurableStore, MemoryStore, RecordStore};
