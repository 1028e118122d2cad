//! SQLite persistence for records and credentials.
//!
//! All access to the connection goes through one mutex, so transactions are
//! strictly ordered. The schema matches the tables written by earlier
//! CoolDNS deployments, so an existing `cool.db` loads unchanged.

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::auth::Credential;
use crate::error::CoolDnsError;
use crate::record::DomainRecord;
use crate::store::codec::{self, RecordRow};

const CREATE_RECORDS: &str = "
CREATE TABLE IF NOT EXISTS cooldns (
  hostname TEXT,
  ip4 TEXT,
  ip6 TEXT,
  offline BOOLEAN,
  txt TEXT,
  mx TEXT,
  cname TEXT,
  UNIQUE (hostname) ON CONFLICT REPLACE
);";

const CREATE_USERS: &str = "
CREATE TABLE IF NOT EXISTS users (
  name TEXT,
  salt BLOB,
  key BLOB,
  UNIQUE (name) ON CONFLICT REPLACE
);";

/// Everything read from the store at startup.
#[derive(Debug, Default)]
pub struct LoadedState {
    /// Every decodable record row, offline ones included.
    pub records: Vec<DomainRecord>,
    /// Every decodable credential row.
    pub credentials: Vec<Credential>,
    /// Rows that failed to decode and were skipped.
    pub skipped: usize,
}

/// Transactional SQLite backend.
pub struct SqliteBackend {
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("open", &self.conn.lock().is_some())
            .finish()
    }
}

impl SqliteBackend {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoolDnsError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened record database");
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, CoolDnsError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self, CoolDnsError> {
        let tx = conn.transaction()?;
        tx.execute_batch(CREATE_RECORDS)?;
        tx.execute_batch(CREATE_USERS)?;
        tx.commit()?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Read every row of both tables.
    ///
    /// Rows that cannot be read at all, such as a NULL hostname, are logged
    /// and skipped. Statement level failures abort the load.
    pub fn load(&self) -> Result<LoadedState, CoolDnsError> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(CoolDnsError::StoreClosed)?;
        let mut state = LoadedState::default();

        let mut stmt =
            conn.prepare("SELECT hostname, ip4, ip6, offline, txt, mx, cname FROM cooldns")?;
        let rows = stmt.query_map([], |row| {
            Ok(RecordRow {
                hostname: row.get(0)?,
                ip4: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ip6: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                offline: row.get::<_, Option<bool>>(3)?.unwrap_or(false),
                txt: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                mx: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                cname: row.get(6)?,
            })
        })?;
        for row in rows {
            let decoded = row.map(codec::decode_record);
            match decoded {
                Ok(record) => state.records.push(record),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable record row");
                    state.skipped += 1;
                }
            }
        }

        let mut stmt = conn.prepare("SELECT name, salt, key FROM users")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;
        for row in rows {
            let decoded = row
                .map_err(CoolDnsError::from)
                .and_then(|(name, salt, key)| Credential::from_parts(name, &salt, &key));
            match decoded {
                Ok(credential) => state.credentials.push(credential),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable credential row");
                    state.skipped += 1;
                }
            }
        }

        debug!(
            records = state.records.len(),
            credentials = state.credentials.len(),
            skipped = state.skipped,
            "loaded record database"
        );
        Ok(state)
    }

    /// Upsert one record row in its own transaction.
    pub fn write_record(&self, record: &DomainRecord) -> Result<(), CoolDnsError> {
        let row = codec::encode_record(record);
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(CoolDnsError::StoreClosed)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO cooldns (hostname, cname, ip4, ip6, offline, mx, txt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![row.hostname, row.cname, row.ip4, row.ip6, row.offline, row.mx, row.txt],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Upsert one credential row in its own transaction.
    pub fn write_credential(&self, credential: &Credential) -> Result<(), CoolDnsError> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(CoolDnsError::StoreClosed)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO users (name, salt, key) VALUES (?1, ?2, ?3)",
            params![credential.name(), credential.salt(), credential.key()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Close the connection. Any later call returns [`CoolDnsError::StoreClosed`].
    pub fn close(&self) -> Result<(), CoolDnsError> {
        let conn = self.conn.lock().take().ok_or(CoolDnsError::StoreClosed)?;
        conn.close().map_err(|(_, e)| CoolDnsError::Persistence(e))?;
        info!("closed record database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MxEntry;

    #[test]
    fn test_write_then_load() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let mut record = DomainRecord::new("h.zone.");
        record.ipv4.push("10.0.0.1".parse().unwrap());
        record.mx.push(MxEntry::new("mail.zone.", 10));
        backend.write_record(&record).unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.records, vec![record]);
        assert_eq!(loaded.skipped, 0);
    }

    #[test]
    fn test_upsert_replaces_row() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let mut record = DomainRecord::new("h.zone.");
        record.ipv4.push("10.0.0.1".parse().unwrap());
        backend.write_record(&record).unwrap();
        record.ipv4 = vec!["10.0.0.2".parse().unwrap()];
        backend.write_record(&record).unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].ipv4[0].to_string(), "10.0.0.2");
    }

    #[test]
    fn test_credential_roundtrip() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let credential =
            Credential::from_parts("h.zone.".to_string(), &[1u8; 8], &[2u8; 32]).unwrap();
        backend.write_credential(&credential).unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.credentials, vec![credential]);
    }

    #[test]
    fn test_close_twice_and_write_after_close() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.close().unwrap();

        assert!(matches!(backend.close(), Err(CoolDnsError::StoreClosed)));
        assert!(matches!(
            backend.write_record(&DomainRecord::new("h.zone.")),
            Err(CoolDnsError::StoreClosed)
        ));
        assert!(matches!(backend.load(), Err(CoolDnsError::StoreClosed)));
    }
}
