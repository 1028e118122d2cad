//! Metrics instrumentation for cooldns.
//!
//! All metrics are prefixed with `cooldns.`. Without an installed recorder
//! every call is a no-op.

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a DNS question.
pub fn record_query(record_type: &str, result: QueryResult, duration: Duration) {
    let result_str = match result {
        QueryResult::Answered => "answered",
        QueryResult::Empty => "empty",
        QueryResult::Refused => "refused",
        QueryResult::NotImplemented => "not_implemented",
    };

    counter!("cooldns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("cooldns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// At least one answer record.
    Answered,
    /// Name unknown or no data of the requested type.
    Empty,
    /// Name outside the served zone.
    Refused,
    /// Opcode other than QUERY.
    NotImplemented,
}

/// Record a dropped packet that could not be parsed.
pub fn record_malformed_packet() {
    counter!("cooldns.query.malformed.count").increment(1);
}

/// Record a reply that could not be sent.
pub fn record_send_failure(transport: &'static str) {
    counter!("cooldns.reply.send_failure.count", "transport" => transport).increment(1);
}

/// Record a store write.
pub fn record_store_write(kind: StoreWrite, ok: bool, duration: Duration) {
    let kind_str = match kind {
        StoreWrite::Record => "record",
        StoreWrite::Credential => "credential",
    };
    let result_str = if ok { "ok" } else { "error" };

    counter!("cooldns.store.write.count", "kind" => kind_str, "result" => result_str).increment(1);
    histogram!("cooldns.store.write.duration.seconds", "kind" => kind_str)
        .record(duration.as_secs_f64());
}

/// What a store write persisted.
#[derive(Debug, Clone, Copy)]
pub enum StoreWrite {
    /// A domain record.
    Record,
    /// A credential.
    Credential,
}

/// Record an update API request by response status.
pub fn record_update_request(status: u16, duration: Duration) {
    counter!("cooldns.http.update.count", "status" => status.to_string()).increment(1);
    histogram!("cooldns.http.update.duration.seconds").record(duration.as_secs_f64());
}

/// Record directory sizes.
pub fn record_directory_counts(records: usize, credentials: usize) {
    gauge!("cooldns.directory.records.count").set(records as f64);
    gauge!("cooldns.directory.credentials.count").set(credentials as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
