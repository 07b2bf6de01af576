use std::sync::atomic::{AtomicI64, Ordering};

use crate::storage::models::StatusIndexPool;

/// In-memory allocation state for the pool a node is currently issuing from.
///
/// The cursor only moves forward and never passes `block_size`; once it
/// reaches the end the pool stays exhausted for good.
#[derive(Debug)]
pub struct ActivePool {
    block_size: u32,
    cursor: AtomicI64,
    id: u64,
}

impl ActivePool {
    pub fn new(id: u64, block_size: u32) -> Self {
        Self {
            block_size,
            cursor: AtomicI64::new(0),
            id,
        }
    }

    pub fn from_pool(pool: &StatusIndexPool) -> Self {
        let block_size = i64::from(pool.block_size);
        let cursor = if pool.cursor < 0 {
            block_size
        } else {
            pool.cursor.min(block_size)
        };
        Self {
            block_size: pool.block_size,
            cursor: AtomicI64::new(cursor),
            id: pool.id,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Next unused offset, or -1 once exhausted.
    pub fn cursor(&self) -> i64 {
        let cursor = self.cursor.load(Ordering::Acquire);
        if cursor >= i64::from(self.block_size) {
            -1
        } else {
            cursor
        }
    }

    /// Offsets handed out so far, at most `block_size`.
    pub fn claimed(&self) -> i64 {
        self.cursor
            .load(Ordering::Acquire)
            .min(i64::from(self.block_size))
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor() < 0
    }

    /// Claim the next global index in this pool, or -1 once exhausted.
    pub fn next_index(&self) -> i64 {
        let block_size = i64::from(self.block_size);
        let mut current = self.cursor.load(Ordering::Acquire);
        loop {
            if current >= block_size {
                return -1;
            }
            match self.cursor.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return self.id as i64 * block_size + current,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_next_index_is_offset_by_pool_id() {
        let pool = ActivePool::new(3, 10);
        assert_eq!(pool.next_index(), 30);
        assert_eq!(pool.next_index(), 31);
        assert_eq!(pool.cursor(), 2);
    }

    #[test]
    fn test_exhausted_pool_never_wraps() {
        let pool = ActivePool::new(0, 2);
        assert_eq!(pool.next_index(), 0);
        assert_eq!(pool.next_index(), 1);
        assert_eq!(pool.next_index(), -1);
        assert_eq!(pool.next_index(), -1);
        assert!(pool.is_exhausted());
    }

    #[test]
    fn test_from_persisted_exhausted_pool() {
        let mut persisted = StatusIndexPool::new(1, 0, 5, 2);
        persisted.cursor = -1;
        let pool = ActivePool::from_pool(&persisted);
        assert_eq!(pool.next_index(), -1);

        persisted.cursor = 3;
        let pool = ActivePool::from_pool(&persisted);
        assert_eq!(pool.next_index(), 8);
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let pool = Arc::new(ActivePool::new(0, 1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let mut claimed = Vec::new();
                    loop {
                        let idx = pool.next_index();
                        if idx < 0 {
                            break;
                        }
                        claimed.push(idx);
                    }
                    claimed
                })
            })
            .collect();

        let mut all = HashSet::new();
        for h in handles {
            for idx in h.join().unwrap() {
                assert!(all.insert(idx), "index {idx} claimed twice");
            }
        }
        assert_eq!(all.len(), 1000);
    }
}
