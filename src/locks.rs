//! Per-user mutual exclusion for gamification read-modify-write cycles.
//!
//! Streak, XP and achievement updates for one user must not interleave.
//! Callers wrap the whole load/compute/save sequence (which itself runs in a
//! storage transaction) in `with_user_lock`.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Default)]
pub struct UserLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `user_id`. Different users never
    /// block each other. The entry is dropped again once no caller holds or
    /// waits on it, so the map only grows with concurrent users.
    pub fn with_user_lock<T>(&self, user_id: i64, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(user_id);
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        // Waiters hold their own clone, so a count of one means only the map has it.
        self.locks
            .remove_if(&user_id, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    fn lock_for(&self, user_id: i64) -> Arc<Mutex<()>> {
        // Clone the Arc out so the map shard is not held while `f` runs.
        self.locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Number of users with a lock currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
