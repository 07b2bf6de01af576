//! Entity-scoped locks.
//!
//! Serializes read-modify-write cycles on a single persisted entity (a status
//! pool) while leaving other entities free to proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};

#[derive(Debug, Clone, Default)]
pub struct EntityLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Held for the duration of an entity update; the lock is released on drop.
#[must_use = "the entity lock is released as soon as the guard is dropped"]
pub struct EntityLockGuard {
    key: String,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl EntityLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for EntityLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLockGuard").field("key", &self.key).finish()
    }
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `key` is acquired.
    pub fn lock(&self, key: &str) -> EntityLockGuard {
        // Keys are never removed: pools are never deleted, so the map is bounded
        // by the number of pools.
        let entry = {
            let mut map = self.inner.lock();
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        EntityLockGuard {
            key: key.to_string(),
            _guard: entry.lock_arc(),
        }
    }
}
