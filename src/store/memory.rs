//! In-memory record store.
//!
//! Same directory semantics as the durable store with nothing persisted.
//! Used by tests and by setups that do not need a database file.

use std::sync::Arc;

use crate::auth::Credential;
use crate::error::CoolDnsError;
use crate::record::DomainRecord;
use crate::state::Directory;
use crate::store::{apply_to_directory, RecordStore};

/// Directory-only record store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    directory: Directory,
}

impl MemoryStore {
    /// Create a store over a fresh directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store over an existing directory.
    pub fn with_directory(directory: Directory) -> Self {
        Self { directory }
    }

    /// The directory this store writes to.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }
}

impl RecordStore for MemoryStore {
    fn get_entry(&self, hostname: &str) -> Option<Arc<DomainRecord>> {
        self.directory.get(hostname)
    }

    fn save_entry(&self, record: DomainRecord) -> Result<(), CoolDnsError> {
        record.validate()?;
        apply_to_directory(&self.directory, &record);
        Ok(())
    }

    fn get_auth(&self, name: &str) -> Option<Arc<Credential>> {
        self.directory.get_credential(name)
    }

    fn save_auth(&self, credential: Credential) -> Result<(), CoolDnsError> {
        self.directory.put_credential(credential);
        Ok(())
    }

    fn close(&self) -> Result<(), CoolDnsError> {
        Ok(())
    }
}
