//! Persistent storage using redb.
//!
//! This module provides ACID-compliant storage for:
//! - Task records and their state machine
//! - Locally stored clips
//! - The paired-device directory and their identity keys
//! - Secrets for the secure-storage fallback
//!
//! The database file is restricted to its owner on unix. Secrets kept in it
//! are no better protected than the file itself.

use crate::error::ClipSyncError;
use parking_lot::{Mutex, RwLock};
use redb::Database;
use std::path::Path;
use std::sync::Arc;

// Submodules
mod clips;
mod peer_identities;
mod peers;
mod secrets;
mod tasks;

use clips::CLIPS_TABLE;
use peer_identities::PEER_IDENTITIES_TABLE;
use peers::PEERS_TABLE;
use secrets::SECRETS_TABLE;
use tasks::TASKS_TABLE;

pub use secrets::StorageSecretStore;

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
    clock: Arc<MonotonicClock>,
}

impl Storage {
    /// Create a new storage instance at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file
    /// - Create all required tables
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ClipSyncError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;
        restrict_to_owner(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TASKS_TABLE)?;
            let _ = write_txn.open_table(CLIPS_TABLE)?;
            let _ = write_txn.open_table(PEERS_TABLE)?;
            let _ = write_txn.open_table(PEER_IDENTITIES_TABLE)?;
            let _ = write_txn.open_table(SECRETS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            clock: Arc::new(MonotonicClock::default()),
        })
    }

    /// Get a reference to the shared database handle
    pub fn db_handle(&self) -> Arc<RwLock<Database>> {
        self.db.clone()
    }

    /// Current time in unix millis, strictly greater than any value
    /// previously returned by this store.
    pub(crate) fn now_millis(&self) -> i64 {
        self.clock.tick()
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<(), ClipSyncError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<(), ClipSyncError> {
    Ok(())
}

/// Wall clock that never repeats or goes backwards.
///
/// Two transitions inside the same millisecond still receive distinct,
/// increasing `modify_time` values.
#[derive(Default)]
struct MonotonicClock {
    last: Mutex<i64>,
}

impl MonotonicClock {
    fn tick(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last.lock();
        let next = if now > *last { now } else { *last + 1 };
        *last = next;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_can_be_created() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb"));
        assert!(storage.is_ok());
    }

    #[test]
    fn test_storage_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b").join("test.redb");
        Storage::new(&nested).unwrap();
        assert!(nested.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_database_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.redb");
        Storage::new(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_clock_strictly_increases() {
        let clock = MonotonicClock::default();
        let mut previous = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > previous);
            previous = next;
        }
    }
}
