//! The shard directory contract: writer factory, lock state and reads.

use std::sync::Arc;

use tessera_common::Result;

use crate::{
    model::{EntryKey, Resource, ShardName, TermQuery},
    writer::ShardWriter,
};

/// Resolves shard names to their physical storage and hands out write handles.
///
/// One directory instance serves the whole shard set. `open_writer` takes the
/// shard's exclusive write lock and fails when another writer (possibly in
/// another process) already holds it; `is_locked`/`force_unlock` expose the
/// lock state for the coordinator's rollback recovery path, which clears locks
/// left behind by writers that failed to abort cleanly.
///
/// The read-through surface (`find`/`search`) observes committed state only;
/// mutations staged on open writers are invisible until the writer commits.
pub trait ShardDirectory: Send + Sync + 'static {
    /// Opens a new write handle for the shard, taking its exclusive write lock.
    fn open_writer(&self, shard: &ShardName) -> Result<Arc<dyn ShardWriter>>;

    /// Whether the shard's storage currently holds an exclusive write lock.
    fn is_locked(&self, shard: &ShardName) -> Result<bool>;

    /// Clears the shard's exclusive write lock regardless of owner.
    fn force_unlock(&self, shard: &ShardName) -> Result<()>;

    /// Looks up the committed entry with the given key within one shard.
    fn find(&self, shard: &ShardName, key: &EntryKey) -> Result<Option<Resource>>;

    /// Runs the query against the committed state of the given shards and
    /// merges the results.
    fn search(&self, shards: &[ShardName], query: &TermQuery) -> Result<Vec<Resource>>;
}
