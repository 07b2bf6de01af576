use thiserror::Error;

use super::bits::{BitsError, TokenStatus};
use super::StatusListKind;
use crate::config::StatusListConfig;
use crate::storage::models::StatusIndexPool;
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Status bits error: {0}")]
    Bits(#[from] BitsError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("{kind} status pool {id} has block size {actual}, expected {expected}")]
    LayoutMismatch {
        kind: StatusListKind,
        id: u64,
        expected: u32,
        actual: u32,
    },
    #[error("{kind} status pool {id} not found")]
    NotFound { kind: StatusListKind, id: u64 },
    #[error("Status {status:?} does not fit in {bit_size} bits")]
    StatusTooWide { status: TokenStatus, bit_size: u8 },
}

/// Persistence-backed operations on the status pools of one kind.
#[derive(Clone)]
pub struct PoolService {
    bit_size: u8,
    block_size: u32,
    db: Database,
    kind: StatusListKind,
}

impl PoolService {
    pub fn new(db: Database, kind: StatusListKind, config: &StatusListConfig) -> Self {
        Self {
            bit_size: config.bit_size,
            block_size: config.block_size,
            db,
            kind,
        }
    }

    pub fn kind(&self) -> StatusListKind {
        self.kind
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn bit_size(&self) -> u8 {
        self.bit_size
    }

    /// Block number owning `global_index`.
    pub fn pool_id_for(&self, global_index: u64) -> u64 {
        global_index / u64::from(self.block_size)
    }

    fn lock_key(&self, pool_id: u64) -> String {
        format!("{}_status_pool:{pool_id}", self.kind)
    }

    /// Create a fresh pool owned by `node_id`.
    ///
    /// A duplicate-key rejection from the store is retried once; the store
    /// advances its sequence before rejecting, so the retry sees a new id.
    pub fn allocate(&self, node_id: u32) -> Result<StatusIndexPool, PoolError> {
        let pool = match self
            .db
            .create_pool(self.kind, node_id, self.block_size, self.bit_size)
        {
            Err(DatabaseError::DuplicateKey(key)) => {
                tracing::warn!(kind = %self.kind, %key, node_id, "Status pool id taken, retrying allocation");
                self.db
                    .create_pool(self.kind, node_id, self.block_size, self.bit_size)?
            }
            other => other?,
        };

        tracing::info!(
            kind = %self.kind,
            pool_id = pool.id,
            node_id,
            start_index = pool.start_index(),
            "Allocated status index pool"
        );
        Ok(pool)
    }

    /// Load the pool owning `global_index`.
    ///
    /// A missing pool means the index was never issued by any node.
    pub fn get_pool_by_index(&self, global_index: u64) -> Result<StatusIndexPool, PoolError> {
        let id = self.pool_id_for(global_index);
        let pool = self
            .db
            .get_pool(self.kind, id)?
            .ok_or(PoolError::NotFound {
                kind: self.kind,
                id,
            })?;

        if pool.block_size != self.block_size {
            return Err(PoolError::LayoutMismatch {
                kind: self.kind,
                id,
                expected: self.block_size,
                actual: pool.block_size,
            });
        }
        Ok(pool)
    }

    /// Set `status` on every index in `indexes`, all of which must belong to
    /// pool `pool_id`. Writers to the same pool are serialized; the lock is
    /// released on every exit path.
    ///
    /// Returns the number of entries written.
    pub fn update_with_lock(
        &self,
        pool_id: u64,
        indexes: &[u64],
        status: TokenStatus,
    ) -> Result<usize, PoolError> {
        if !status.fits(self.bit_size) {
            return Err(PoolError::StatusTooWide {
                status,
                bit_size: self.bit_size,
            });
        }

        let _guard = self.db.lock_entity(&self.lock_key(pool_id));

        let written = self
            .db
            .modify_pool(self.kind, pool_id, |pool| -> Result<usize, BitsError> {
                let block_size = u64::from(pool.block_size);
                for &index in indexes {
                    debug_assert!(pool.contains(index), "index {index} not in pool {pool_id}");
                    pool.bits.set_status(index % block_size, status)?;
                }
                Ok(indexes.len())
            })?
            .ok_or(PoolError::NotFound {
                kind: self.kind,
                id: pool_id,
            })??;

        tracing::debug!(kind = %self.kind, pool_id, count = written, ?status, "Updated status pool");
        Ok(written)
    }

    /// Advance the persisted cursor of a pool to `cursor`.
    ///
    /// The stored cursor never moves backwards and an exhausted pool keeps
    /// its -1 marker. Returns the cursor now stored.
    pub fn record_cursor(&self, pool_id: u64, cursor: i64) -> Result<i64, PoolError> {
        let _guard = self.db.lock_entity(&self.lock_key(pool_id));
        self.db
            .modify_pool(self.kind, pool_id, |pool| {
                let cursor = cursor.min(i64::from(pool.block_size));
                if pool.cursor >= 0 && cursor > pool.cursor {
                    pool.cursor = cursor;
                }
                pool.cursor
            })?
            .ok_or(PoolError::NotFound {
                kind: self.kind,
                id: pool_id,
            })
    }

    /// Persist that the owning node will never allocate from this pool again.
    pub fn mark_exhausted(&self, pool_id: u64) -> Result<(), PoolError> {
        let _guard = self.db.lock_entity(&self.lock_key(pool_id));
        self.db
            .modify_pool(self.kind, pool_id, |pool| pool.cursor = -1)?
            .ok_or(PoolError::NotFound {
                kind: self.kind,
                id: pool_id,
            })
    }

    /// Every persisted pool of this kind, ordered by id.
    pub fn all_pools(&self) -> Result<Vec<StatusIndexPool>, PoolError> {
        Ok(self.db.get_all_pools(self.kind)?)
    }
}
