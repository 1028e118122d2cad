//! Error types for cooldns.

use thiserror::Error;

/// Errors that can occur in the DNS server, the record store and the update API.
#[derive(Debug, Error)]
pub enum CoolDnsError {
    /// Credential input did not meet the minimum constraints.
    #[error("credential constraints not met: {0}")]
    Constraint(String),

    /// No record or credential exists for the given name.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage transaction or query failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("malformed stored record {key:?}: {reason}")]
    MalformedRecord {
        /// Hostname or credential name of the offending row.
        key: String,
        /// What failed to decode.
        reason: String,
    },

    /// A record failed validation before being written.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The store has already been closed.
    #[error("record store is closed")]
    StoreClosed,

    /// The OS random source could not supply a salt.
    #[error("failed to read random bytes: {0}")]
    Entropy(#[from] rand::Error),

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configured TSIG secret is not valid base64.
    #[error("invalid TSIG key: {0}")]
    InvalidTsigKey(String),

    /// TSIG signing failed.
    #[error("TSIG error: {0}")]
    Tsig(#[from] hickory_proto::dnssec::DnsSecError),
}
