//! Record store: the write path for records and credentials.
//!
//! [`RecordStore`] is the capability the update API and the CLI use. Reads
//! are served from the [`Directory`]; writes update the directory first and
//! are then persisted. A failed commit is reported to the caller but the
//! directory keeps the new value.

pub mod codec;
pub mod memory;
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::Credential;
use crate::error::CoolDnsError;
use crate::metrics::{self, StoreWrite, Timer};
use crate::record::DomainRecord;
use crate::state::Directory;

pub use memory::MemoryStore;
pub use sqlite::SqliteBackend;

/// Operations the update boundary needs from storage.
///
/// Implementations must be callable from many tasks at once.
pub trait RecordStore: Send + Sync {
    /// Live record for a normalized hostname.
    fn get_entry(&self, hostname: &str) -> Option<Arc<DomainRecord>>;

    /// Validate and save a record, replacing any previous value.
    fn save_entry(&self, record: DomainRecord) -> Result<(), CoolDnsError>;

    /// Credential for a registrant name.
    fn get_auth(&self, name: &str) -> Option<Arc<Credential>>;

    /// Save a credential, replacing any previous value.
    fn save_auth(&self, credential: Credential) -> Result<(), CoolDnsError>;

    /// Release the underlying storage. Call at most once, at shutdown.
    fn close(&self) -> Result<(), CoolDnsError>;
}

/// Apply a record write to the directory: online records replace the live
/// value, offline records withdraw it.
pub(crate) fn apply_to_directory(directory: &Directory, record: &DomainRecord) {
    if record.offline {
        directory.remove(&record.hostname);
    } else {
        directory.put(record.clone());
    }
}

/// SQLite-backed store composed with an injected directory.
#[derive(Debug)]
pub struct DurableStore {
    directory: Directory,
    backend: SqliteBackend,
}

impl DurableStore {
    /// Open the database at `path` and seed `directory` from it.
    pub fn open(path: impl AsRef<Path>, directory: Directory) -> Result<Self, CoolDnsError> {
        Self::with_backend(SqliteBackend::open(path)?, directory)
    }

    /// Seed `directory` from an already opened backend.
    pub fn with_backend(
        backend: SqliteBackend,
        directory: Directory,
    ) -> Result<Self, CoolDnsError> {
        let loaded = backend.load()?;
        if loaded.skipped > 0 {
            warn!(skipped = loaded.skipped, "some stored rows could not be decoded");
        }

        let total = loaded.records.len();
        let online: Vec<DomainRecord> = loaded.records.into_iter().filter(|r| !r.offline).collect();
        info!(
            records = total,
            online = online.len(),
            credentials = loaded.credentials.len(),
            "seeding directory from record store"
        );
        directory.load(online, loaded.credentials);
        directory.emit_metrics();

        Ok(Self { directory, backend })
    }

    /// The directory this store keeps current.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }
}

impl RecordStore for DurableStore {
    fn get_entry(&self, hostname: &str) -> Option<Arc<DomainRecord>> {
        self.directory.get(hostname)
    }

    fn save_entry(&self, record: DomainRecord) -> Result<(), CoolDnsError> {
        record.validate()?;
        apply_to_directory(&self.directory, &record);

        let timer = Timer::start();
        let result = self.backend.write_record(&record);
        metrics::record_store_write(StoreWrite::Record, result.is_ok(), timer.elapsed());
        if let Err(ref e) = result {
            warn!(hostname = %record.hostname, error = %e, "failed to persist record");
        }
        result
    }

    fn get_auth(&self, name: &str) -> Option<Arc<Credential>> {
        self.directory.get_credential(name)
    }

    fn save_auth(&self, credential: Credential) -> Result<(), CoolDnsError> {
        self.directory.put_credential(credential.clone());

        let timer = Timer::start();
        let result = self.backend.write_credential(&credential);
        metrics::record_store_write(StoreWrite::Credential, result.is_ok(), timer.elapsed());
        if let Err(ref e) = result {
            warn!(name = %credential.name(), error = %e, "failed to persist credential");
        }
        result
    }

    fn close(&self) -> Result<(), CoolDnsError> {
        self.backend.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MxEntry;

    fn open_store() -> DurableStore {
        DurableStore::with_backend(SqliteBackend::open_in_memory().unwrap(), Directory::new())
            .unwrap()
    }

    #[test]
    fn test_save_entry_updates_directory() {
        let store = open_store();
        let mut record = DomainRecord::new("h.zone.");
        record.ipv4.push("10.0.0.1".parse().unwrap());
        record.mx.push(MxEntry::new("mail.zone.", 10));

        store.save_entry(record.clone()).unwrap();

        assert_eq!(*store.get_entry("h.zone.").unwrap(), record);
        assert_eq!(*store.directory().get("h.zone.").unwrap(), record);
    }

    #[test]
    fn test_offline_entry_withdrawn_from_directory() {
        let store = open_store();
        let mut record = DomainRecord::new("h.zone.");
        record.ipv4.push("10.0.0.1".parse().unwrap());
        store.save_entry(record.clone()).unwrap();

        record.offline = true;
        store.save_entry(record).unwrap();

        assert!(store.get_entry("h.zone.").is_none());
    }

    #[test]
    fn test_invalid_entry_rejected_before_directory() {
        let store = open_store();
        let mut record = DomainRecord::new("h.zone.");
        record.txt.push("bad\x1fvalue".to_string());

        assert!(matches!(store.save_entry(record), Err(CoolDnsError::InvalidRecord(_))));
        assert!(store.get_entry("h.zone.").is_none());
    }

    #[test]
    fn test_unnormalized_hostname_rejected() {
        let store = open_store();
        let mut record = DomainRecord::new("h.zone.");
        record.hostname = "H.Zone.".to_string();

        assert!(matches!(store.save_entry(record), Err(CoolDnsError::InvalidRecord(_))));
        assert_eq!(store.directory().records_count(), 0);
    }

    #[test]
    fn test_persistence_failure_keeps_directory_value() {
        let store = open_store();
        store.close().unwrap();

        let record = DomainRecord::new("h.zone.");
        assert!(matches!(store.save_entry(record), Err(CoolDnsError::StoreClosed)));
        assert!(store.get_entry("h.zone.").is_some());
    }

    #[test]
    fn test_save_auth() {
        let store = open_store();
        let credential =
            Credential::from_parts("h.zone.".to_string(), &[3u8; 8], &[4u8; 32]).unwrap();
        store.save_auth(credential.clone()).unwrap();
        assert_eq!(*store.get_auth("h.zone.").unwrap(), credential);
    }
}
