//! Per-digest mutual exclusion
//!
//! Finalize, delete and release all touch the canonical object of one digest.
//! Within a process they are serialized by a mutex keyed on the digest. Entries
//! are created on demand and dropped as soon as nobody holds or waits on them.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct DigestLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DigestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `digest`
    pub fn with_lock<T>(&self, digest: &str, f: impl FnOnce() -> T) -> T {
        // Clone out of the map so the shard lock is not held while we block
        let lock = Arc::clone(self.locks.entry(digest.to_owned()).or_default().value());

        let result = {
            let _guard = lock.lock();
            f()
        };

        // Two references left means the map and us: nobody else is waiting
        self.locks
            .remove_if(digest, |_, entry| Arc::strong_count(entry) == 2);
        result
    }

    /// Number of digests with a live lock entry
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}
