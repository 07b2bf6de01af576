use chrono::Utc;
use redb::{ReadableTable, TableDefinition};

use super::db::{Database, DatabaseError};
use super::models::StatusIndexPool;
use super::tables::*;
use crate::status::StatusListKind;

fn pool_table(kind: StatusListKind) -> TableDefinition<'static, u64, &'static [u8]> {
    match kind {
        StatusListKind::Session => SESSION_STATUS_POOLS,
        StatusListKind::Token => TOKEN_STATUS_POOLS,
    }
}

fn pool_sequence_key(kind: StatusListKind) -> &'static str {
    match kind {
        StatusListKind::Session => "session_status_pool",
        StatusListKind::Token => "token_status_pool",
    }
}

impl Database {
    // ========================================================================
    // Status pool operations
    // ========================================================================

    /// Create the next pool for `kind`, owned by `owner_node_id`.
    ///
    /// The id comes from a persisted sequence read and advanced inside the
    /// same write transaction as the insert. If the sequence points at an id
    /// that already exists, the sequence is moved past the highest stored id
    /// and `DuplicateKey` is returned so the caller can retry.
    pub fn create_pool(
        &self,
        kind: StatusListKind,
        owner_node_id: u32,
        block_size: u32,
        bit_size: u8,
    ) -> Result<StatusIndexPool, DatabaseError> {
        let seq_key = pool_sequence_key(kind);
        let write_txn = self.begin_write()?;

        let created = {
            let mut pools = write_txn.open_table(pool_table(kind))?;
            let mut sequences = write_txn.open_table(SEQUENCES)?;

            let id = sequences.get(seq_key)?.map(|v| v.value()).unwrap_or(0);

            if pools.get(id)?.is_some() {
                let next_free = pools.last()?.map(|(k, _)| k.value() + 1).unwrap_or(0);
                sequences.insert(seq_key, next_free.max(id + 1))?;
                Err(id)
            } else {
                let pool = StatusIndexPool::new(id, owner_node_id, block_size, bit_size);
                let data = rmp_serde::to_vec_named(&pool)?;
                pools.insert(id, data.as_slice())?;
                sequences.insert(seq_key, id + 1)?;
                Ok(pool)
            }
        };

        write_txn.commit()?;
        created.map_err(|id| DatabaseError::DuplicateKey(format!("{}:{id}", kind.as_str())))
    }

    /// Get a pool by block number
    pub fn get_pool(
        &self,
        kind: StatusListKind,
        id: u64,
    ) -> Result<Option<StatusIndexPool>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(pool_table(kind))?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Load, mutate and store a pool in a single write transaction.
    ///
    /// Returns `None` without writing if the pool does not exist.
    pub fn modify_pool<T>(
        &self,
        kind: StatusListKind,
        id: u64,
        f: impl FnOnce(&mut StatusIndexPool) -> T,
    ) -> Result<Option<T>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(pool_table(kind))?;
            let existing: Option<StatusIndexPool> = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            match existing {
                Some(mut pool) => {
                    let out = f(&mut pool);
                    pool.updated_at = Utc::now();
                    let data = rmp_serde::to_vec_named(&pool)?;
                    table.insert(id, data.as_slice())?;
                    Some(out)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    /// All pools of `kind`, ordered by block number.
    pub fn get_all_pools(&self, kind: StatusListKind) -> Result<Vec<StatusIndexPool>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(pool_table(kind))?;

        let mut pools = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            pools.push(rmp_serde::from_slice(value.value())?);
        }
        Ok(pools)
    }

    #[cfg(test)]
    pub(crate) fn reset_pool_sequence(&self, kind: StatusListKind) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut sequences = write_txn.open_table(SEQUENCES)?;
            sequences.insert(pool_sequence_key(kind), 0)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
