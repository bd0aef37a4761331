//! Engine-level policy consumed by the transaction coordinator.

use crate::model::ShardName;

/// Finalization policy supplied by the embedding engine.
pub trait EnginePolicy: Send + Sync + 'static {
    /// Whether per-shard prepare/commit work may run with bounded parallelism.
    /// When `false`, finalization runs strictly sequentially.
    fn supports_concurrent_commits(&self) -> bool {
        false
    }

    /// Upper bound on concurrently running per-shard finalization tasks.
    fn max_concurrency(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
    }

    /// Cache-invalidation hint fired once per shard after a successful commit.
    /// A side effect only; not part of the commit correctness contract.
    fn notify_committed(&self, shard: &ShardName) {
        let _ = shard;
    }
}
