use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::bits::TokenStatus;
use super::pool::ActivePool;
use super::pool_service::{PoolError, PoolService};
use super::StatusListKind;

/// Per-process issuance of status list indexes for one kind.
///
/// Indexes come from the pool this node currently owns. The common case is a
/// single atomic increment with no lock; the rollover mutex is only taken
/// once per `block_size` issuances, when the current pool runs out.
pub struct IndexIssuanceService {
    current: ArcSwapOption<ActivePool>,
    node_id: u32,
    pools: PoolService,
    rollover: Mutex<()>,
}

/// Outcome of updating one pool during a batched status update.
#[derive(Debug)]
pub struct PoolUpdate {
    pub outcome: Result<usize, PoolError>,
    pub pool_id: u64,
    pub requested: usize,
}

/// Per-pool results of [`IndexIssuanceService::update_status_at_indexes`].
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub pools: Vec<PoolUpdate>,
    /// Entries dropped before grouping (negative / unassigned indexes)
    pub skipped: usize,
}

impl UpdateReport {
    /// Total number of entries written across all pools.
    pub fn updated(&self) -> usize {
        self.pools
            .iter()
            .filter_map(|p| p.outcome.as_ref().ok())
            .sum()
    }

    pub fn failed_pools(&self) -> Vec<u64> {
        self.pools
            .iter()
            .filter(|p| p.outcome.is_err())
            .map(|p| p.pool_id)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.pools.iter().all(|p| p.outcome.is_ok())
    }
}

impl IndexIssuanceService {
    pub fn new(pools: PoolService, node_id: u32) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            node_id,
            pools,
            rollover: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> StatusListKind {
        self.pools.kind()
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn pool_service(&self) -> &PoolService {
        &self.pools
    }

    /// Id of the pool this node is currently issuing from, if any.
    pub fn current_pool_id(&self) -> Option<u64> {
        self.current.load().as_ref().map(|p| p.id())
    }

    /// Issue the next status list index, or -1 if none could be allocated.
    ///
    /// Never fails or panics: the credential being issued must not be blocked
    /// by status tracking.
    pub fn next(&self) -> i64 {
        if let Some(pool) = self.current.load().as_ref() {
            let index = pool.next_index();
            if index >= 0 {
                return index;
            }
        }

        match catch_unwind(AssertUnwindSafe(|| self.next_slow())) {
            Ok(Ok(index)) => index,
            Ok(Err(e)) => {
                error!(kind = %self.kind(), node_id = self.node_id, error = %e, "Failed to allocate status list index");
                -1
            }
            Err(_) => {
                error!(kind = %self.kind(), node_id = self.node_id, "Status list index allocation panicked");
                -1
            }
        }
    }

    fn next_slow(&self) -> Result<i64, PoolError> {
        let _guard = self.rollover.lock();

        // Another thread may have replaced the pool while we waited.
        let exhausted = match self.current.load_full() {
            Some(pool) => {
                let index = pool.next_index();
                if index >= 0 {
                    return Ok(index);
                }
                Some(pool.id())
            }
            None => None,
        };

        if let Some(pool_id) = exhausted {
            if let Err(e) = self.pools.mark_exhausted(pool_id) {
                warn!(kind = %self.kind(), pool_id, error = %e, "Failed to mark status pool exhausted");
            }
        }

        let persisted = self.pools.allocate(self.node_id)?;
        let pool = Arc::new(ActivePool::from_pool(&persisted));
        let index = pool.next_index();
        self.current.store(Some(pool));
        Ok(index)
    }

    /// Persist how far allocation has got in the current pool.
    pub fn checkpoint(&self) -> Result<(), PoolError> {
        if let Some(pool) = self.current.load_full() {
            let cursor = self.pools.record_cursor(pool.id(), pool.claimed())?;
            debug!(kind = %self.kind(), pool_id = pool.id(), cursor, "Checkpointed status pool cursor");
        }
        Ok(())
    }

    /// Set `status` on every given index, grouped by owning pool.
    ///
    /// Best-effort: negative entries are dropped, and a failure on one pool
    /// is logged and reported without stopping updates to the others.
    pub fn update_status_at_indexes(&self, indexes: &[i64], status: TokenStatus) -> UpdateReport {
        let mut report = UpdateReport::default();
        let mut by_pool: BTreeMap<u64, Vec<u64>> = BTreeMap::new();

        for &index in indexes {
            match u64::try_from(index) {
                Ok(index) => by_pool
                    .entry(self.pools.pool_id_for(index))
                    .or_default()
                    .push(index),
                Err(_) => report.skipped += 1,
            }
        }

        for (pool_id, mut pool_indexes) in by_pool {
            pool_indexes.sort_unstable();
            pool_indexes.dedup();

            let outcome = self
                .pools
                .get_pool_by_index(pool_indexes[0])
                .and_then(|pool| self.pools.update_with_lock(pool.id, &pool_indexes, status));

            if let Err(e) = &outcome {
                warn!(kind = %self.kind(), pool_id, count = pool_indexes.len(), error = %e, "Failed to update status pool");
            }

            report.pools.push(PoolUpdate {
                outcome,
                pool_id,
                requested: pool_indexes.len(),
            });
        }

        if !report.pools.is_empty() {
            info!(
                kind = %self.kind(),
                ?status,
                updated = report.updated(),
                failed_pools = report.failed_pools().len(),
                skipped = report.skipped,
                "Applied status update"
            );
        }
        report
    }
}
