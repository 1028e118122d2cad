//! In-memory directory of live records and credentials.
//!
//! The directory is the only thing the DNS listeners read from. It is
//! seeded once from the record store at startup and then kept current by
//! every store write. Values are held behind `Arc` and replaced whole, so a
//! reader sees either the old record or the new one, never a mix.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::auth::Credential;
use crate::metrics;
use crate::record::DomainRecord;

/// Thread-safe in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    inner: Arc<RwLock<DirectoryInner>>,
}

#[derive(Debug, Default)]
struct DirectoryInner {
    /// hostname -> record (online records only)
    records: HashMap<String, Arc<DomainRecord>>,

    /// name -> credential
    credentials: HashMap<String, Arc<Credential>>,
}

impl Directory {
    /// Create a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole content with a freshly loaded seed.
    pub fn load(&self, records: Vec<DomainRecord>, credentials: Vec<Credential>) {
        let records: HashMap<String, Arc<DomainRecord>> = records
            .into_iter()
            .map(|r| (r.hostname.clone(), Arc::new(r)))
            .collect();
        let credentials: HashMap<String, Arc<Credential>> = credentials
            .into_iter()
            .map(|c| (c.name().to_string(), Arc::new(c)))
            .collect();

        let mut inner = self.inner.write();
        inner.records = records;
        inner.credentials = credentials;
        debug!(
            records = inner.records.len(),
            credentials = inner.credentials.len(),
            "loaded directory"
        );
    }

    /// Look up the live record for a normalized hostname.
    pub fn get(&self, hostname: &str) -> Option<Arc<DomainRecord>> {
        self.inner.read().records.get(hostname).cloned()
    }

    /// Insert or replace a record.
    pub fn put(&self, record: DomainRecord) {
        let record = Arc::new(record);
        let mut inner = self.inner.write();
        debug!(hostname = %record.hostname, "putting record");
        inner.records.insert(record.hostname.clone(), record);
    }

    /// Remove a record, e.g. when it goes offline.
    pub fn remove(&self, hostname: &str) -> bool {
        let removed = self.inner.write().records.remove(hostname).is_some();
        if removed {
            debug!(hostname, "removed record");
        }
        removed
    }

    /// Look up a credential by name.
    pub fn get_credential(&self, name: &str) -> Option<Arc<Credential>> {
        self.inner.read().credentials.get(name).cloned()
    }

    /// Insert or replace a credential.
    pub fn put_credential(&self, credential: Credential) {
        let credential = Arc::new(credential);
        let mut inner = self.inner.write();
        debug!(name = %credential.name(), "putting credential");
        inner
            .credentials
            .insert(credential.name().to_string(), credential);
    }

    /// Number of live records.
    pub fn records_count(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Number of credentials.
    pub fn credentials_count(&self) -> usize {
        self.inner.read().credentials.len()
    }

    /// Emit current directory size metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        metrics::record_directory_counts(inner.records.len(), inner.credentials.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MxEntry;

    fn make_record(hostname: &str, ip: &str) -> DomainRecord {
        let mut record = DomainRecord::new(hostname);
        record.ipv4.push(ip.parse().unwrap());
        record
    }

    fn make_credential(name: &str) -> Credential {
        Credential::from_parts(name.to_string(), &[7u8; 8], &[9u8; 32]).unwrap()
    }

    #[test]
    fn test_put_then_get() {
        let directory = Directory::new();
        directory.put(make_record("h.zone.", "10.0.0.1"));

        let record = directory.get("h.zone.").unwrap();
        assert_eq!(record.ipv4, vec!["10.0.0.1".parse::<std::net::Ipv4Addr>().unwrap()]);
        assert!(directory.get("other.zone.").is_none());
    }

    #[test]
    fn test_put_replaces_whole_value() {
        let directory = Directory::new();
        let mut first = make_record("h.zone.", "10.0.0.1");
        first.mx.push(MxEntry::new("mail.zone.", 10));
        directory.put(first);

        directory.put(make_record("h.zone.", "10.0.0.2"));

        let record = directory.get("h.zone.").unwrap();
        assert_eq!(record.ipv4.len(), 1);
        assert!(record.mx.is_empty());
        assert_eq!(directory.records_count(), 1);
    }

    #[test]
    fn test_reader_keeps_old_snapshot() {
        let directory = Directory::new();
        directory.put(make_record("h.zone.", "10.0.0.1"));
        let before = directory.get("h.zone.").unwrap();

        directory.put(make_record("h.zone.", "10.0.0.2"));

        assert_eq!(before.ipv4[0].to_string(), "10.0.0.1");
        assert_eq!(directory.get("h.zone.").unwrap().ipv4[0].to_string(), "10.0.0.2");
    }

    #[test]
    fn test_remove() {
        let directory = Directory::new();
        directory.put(make_record("h.zone.", "10.0.0.1"));

        assert!(directory.remove("h.zone."));
        assert!(!directory.remove("h.zone."));
        assert!(directory.get("h.zone.").is_none());
    }

    #[test]
    fn test_credentials() {
        let directory = Directory::new();
        directory.put_credential(make_credential("h.zone."));

        assert!(directory.get_credential("h.zone.").is_some());
        assert!(directory.get_credential("x.zone.").is_none());
        assert_eq!(directory.credentials_count(), 1);
    }

    #[test]
    fn test_load_replaces_content() {
        let directory = Directory::new();
        directory.put(make_record("stale.zone.", "10.0.0.9"));

        directory.load(
            vec![make_record("a.zone.", "10.0.0.1"), make_record("b.zone.", "10.0.0.2")],
            vec![make_credential("a.zone.")],
        );

        assert!(directory.get("stale.zone.").is_none());
        assert!(directory.get("a.zone.").is_some());
        assert!(directory.get("b.zone.").is_some());
        assert_eq!(directory.records_count(), 2);
        assert_eq!(directory.credentials_count(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let directory = Directory::new();
        let other = directory.clone();
        other.put(make_record("h.zone.", "10.0.0.1"));
        assert!(directory.get("h.zone.").is_some());
    }

    #[test]
    fn test_concurrent_writers_distinct_hosts() {
        let directory = Directory::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let directory = directory.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let host = format!("h{t}-{i}.zone.");
                        directory.put(make_record(&host, "10.0.0.1"));
                        assert!(directory.get(&host).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(directory.records_count(), 400);
    }
}
