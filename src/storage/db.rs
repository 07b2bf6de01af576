use chrono::{DateTime, Utc};
use redb::{Database as RedbDatabase, ReadTransaction, ReadableTableMetadata, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::locks::{EntityLockGuard, EntityLocks};
use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Redb(#[from] redb::Error),
    #[error("Database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
    #[error("Sequence exhausted: {0}")]
    SequenceExhausted(&'static str),
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
}

/// Shared handle to the embedded store.
///
/// Cheap to clone; all clones share the same redb file and entity lock table.
#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
    locks: EntityLocks,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("status-manager.redb");
        let db = RedbDatabase::create(db_path)?;

        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSIONS)?;
            let _ = write_txn.open_table(SESSION_EXPIRY)?;
            let _ = write_txn.open_table(TOKENS)?;
            let _ = write_txn.open_table(TOKEN_EXPIRY)?;
            let _ = write_txn.open_table(SESSION_TOKENS)?;
            let _ = write_txn.open_table(TOKEN_STATUS_POOLS)?;
            let _ = write_txn.open_table(SESSION_STATUS_POOLS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
            let _ = write_txn.open_table(CLUSTER_NODES)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            locks: EntityLocks::new(),
        })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    /// Acquire the lock scoped to a single persisted entity.
    pub fn lock_entity(&self, key: &str) -> EntityLockGuard {
        self.locks.lock(key)
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Purge sessions and tokens - for testing only.
    ///
    /// Status pools are left untouched: indices already handed out must keep
    /// their published status.
    pub fn purge_all(&self) -> Result<PurgeStats, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut stats = PurgeStats::default();

        {
            let mut table = write_txn.open_table(SESSIONS)?;
            stats.sessions = table.len()?;
            table.retain(|_, _| false)?;
        }
        {
            let mut table = write_txn.open_table(SESSION_EXPIRY)?;
            table.retain(|_, _| false)?;
        }
        {
            let mut table = write_txn.open_table(TOKENS)?;
            stats.tokens = table.len()?;
            table.retain(|_, _| false)?;
        }
        {
            let mut table = write_txn.open_table(TOKEN_EXPIRY)?;
            table.retain(|_, _| false)?;
        }
        {
            let mut table = write_txn.open_table(SESSION_TOKENS)?;
            table.retain(|_, _| false)?;
        }

        write_txn.commit()?;
        Ok(stats)
    }
}

/// Statistics from a purge operation
#[derive(Debug, Default)]
pub struct PurgeStats {
    pub sessions: u64,
    pub tokens: u64,
}

/// Build a lexicographically sortable expiration index key.
pub(crate) fn expiry_key(expires_at: &DateTime<Utc>, id: &str) -> String {
    format!("{:020}:{}", expires_at.timestamp_millis().max(0), id)
}

/// Extract the millisecond timestamp from an expiration index key.
pub(crate) fn expiry_key_ms(key: &str) -> Option<i64> {
    key.split_once(':').and_then(|(ms, _)| ms.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_session, setup_db};

    #[test]
    fn test_expiry_keys_sort_by_time() {
        let early = DateTime::from_timestamp_millis(1_000).unwrap();
        let late = DateTime::from_timestamp_millis(20_000).unwrap();
        let a = expiry_key(&early, "zzz");
        let b = expiry_key(&late, "aaa");
        assert!(a < b);
        assert_eq!(expiry_key_ms(&a), Some(1_000));
        assert_eq!(expiry_key_ms(&b), Some(20_000));
    }

    #[test]
    fn test_purge_keeps_status_pools() {
        let (db, _temp) = setup_db();
        db.put_session(&make_session("s1", "user-1")).unwrap();
        db.create_pool(crate::status::StatusListKind::Session, 1, 10, 2)
            .unwrap();

        let stats = db.purge_all().unwrap();
        assert_eq!(stats.sessions, 1);
        assert!(db.get_session("s1").unwrap().is_none());
        assert_eq!(
            db.get_all_pools(crate::status::StatusListKind::Session)
                .unwrap()
                .len(),
            1
        );
    }
}
