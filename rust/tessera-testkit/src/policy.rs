//! Engine policy with observable commit notifications.

use std::sync::Mutex;

use tessera_index_core::{model::ShardName, policy::EnginePolicy};

/// Test policy: fixed concurrency settings plus a record of every
/// cache-invalidation notification the coordinator fired.
pub struct TestPolicy {
    concurrent_commits: bool,
    max_concurrency: usize,
    committed: Mutex<Vec<ShardName>>,
}

impl TestPolicy {
    pub fn sequential() -> TestPolicy {
        TestPolicy {
            concurrent_commits: false,
            max_concurrency: 1,
            committed: Mutex::new(Vec::new()),
        }
    }

    pub fn concurrent(max_concurrency: usize) -> TestPolicy {
        TestPolicy {
            concurrent_commits: true,
            max_concurrency: max_concurrency.max(1),
            committed: Mutex::new(Vec::new()),
        }
    }

    /// Shards for which `notify_committed` fired, sorted.
    pub fn committed_shards(&self) -> Vec<ShardName> {
        let mut shards = self.committed.lock().expect("committed").clone();
        shards.sort();
        shards
    }
}

impl EnginePolicy for TestPolicy {
    fn supports_concurrent_commits(&self) -> bool {
        self.concurrent_commits
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn notify_committed(&self, shard: &ShardName) {
        self.committed.lock().expect("committed").push(shard.clone());
    }
}
