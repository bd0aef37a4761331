//! Per-shard mutual exclusion for writer acquisition.

use std::sync::Mutex;

use ahash::AHashMap;
use tessera_common::{Result, error::Error};
use tessera_index_core::model::ShardName;

/// One mutual-exclusion lock per known shard, built once from the complete
/// shard list.
///
/// The table serializes "open writer if absent" for the *same* shard while
/// letting different shards open fully in parallel. No caller ever holds two
/// shard locks at once, so there is no lock ordering to get wrong.
pub struct ShardLockTable {
    locks: AHashMap<ShardName, Mutex<()>>,
}

impl ShardLockTable {
    /// Builds the table for the given shard set.
    pub fn new(shards: impl IntoIterator<Item = impl Into<ShardName>>) -> ShardLockTable {
        ShardLockTable {
            locks: shards
                .into_iter()
                .map(|s| (s.into(), Mutex::new(())))
                .collect(),
        }
    }

    /// Runs `f` while holding the lock of the given shard. The lock is
    /// released on every exit path, including unwinds out of `f`, and a
    /// poisoned lock is re-entered rather than stranding the shard for the
    /// rest of the unit-of-work.
    pub fn with_shard_lock<R>(&self, shard: &ShardName, f: impl FnOnce() -> R) -> Result<R> {
        let lock = self
            .locks
            .get(shard)
            .ok_or_else(|| Error::invalid_arg("shard", format!("unknown shard '{shard}'")))?;
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(f())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            Arc, Barrier,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };

    #[test]
    fn test_unknown_shard_rejected() {
        let table = ShardLockTable::new(["a", "b"]);
        assert_eq!(table.len(), 2);
        assert!(
            table
                .with_shard_lock(&ShardName::new("zzz"), || ())
                .is_err()
        );
    }

    #[test]
    fn test_same_shard_serialized() {
        let table = Arc::new(ShardLockTable::new(["a"]));
        let shard = ShardName::new("a");
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                let shard = shard.clone();
                let inside = inside.clone();
                let peak = peak.clone();
                thread::spawn(move || {
                    table
                        .with_shard_lock(&shard, || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(2));
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_shards_proceed_in_parallel() {
        let table = Arc::new(ShardLockTable::new(["a", "b"]));
        let rendezvous = Arc::new(Barrier::new(2));

        // Both threads must sit inside their shard's critical section at the
        // same time; a single global lock would deadlock this barrier.
        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let table = table.clone();
                let rendezvous = rendezvous.clone();
                thread::spawn(move || {
                    table
                        .with_shard_lock(&ShardName::new(name), || {
                            rendezvous.wait();
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_lock_released_after_panic() {
        let table = Arc::new(ShardLockTable::new(["a"]));
        let shard = ShardName::new("a");

        let table2 = table.clone();
        let shard2 = shard.clone();
        let _ = thread::spawn(move || {
            let _ = table2.with_shard_lock(&shard2, || panic!("boom"));
        })
        .join();

        // A poisoned shard lock must not strand the shard for the rest of
        // the unit-of-work.
        assert_eq!(table.with_shard_lock(&shard, || 7).unwrap(), 7);
    }
}
