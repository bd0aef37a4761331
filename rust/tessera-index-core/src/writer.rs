//! The per-shard write handle contract.

use tessera_common::Result;

use crate::model::{EntryKey, Resource, ShardName, TermQuery};

/// One open write handle over a single shard.
///
/// A writer is owned exclusively by one transaction coordinator for the
/// duration of one unit-of-work and moves through
/// *open → (prepared) → committed | rolled back*. The handle must be safe for
/// concurrent entry-level mutation from multiple application threads; the
/// coordinator imposes no per-shard operation ordering of its own.
///
/// `commit` does not close the handle: the coordinator may commit a writer
/// mid-transaction as a visibility checkpoint and keep feeding it operations.
/// A `commit` with nothing staged must succeed as a no-op. A `rollback` on an
/// already-closed handle must fail with a
/// [`WriterClosed`](tessera_common::error::ErrorKind::WriterClosed) error,
/// which the coordinator treats as success (idempotent abort).
pub trait ShardWriter: Send + Sync + 'static {
    /// The shard this writer mutates.
    fn shard(&self) -> &ShardName;

    /// Stages a new entry.
    fn create(&self, resource: &Resource) -> Result<()>;

    /// Stages replacement of the entry with the resource's key.
    fn update(&self, resource: &Resource) -> Result<()>;

    /// Stages removal of the entry with the given key.
    fn delete(&self, key: &EntryKey) -> Result<()>;

    /// Stages removal of every entry matching the query.
    fn delete_by_query(&self, query: &TermQuery) -> Result<()>;

    /// First phase of a two-phase commit: validates the staged mutations and
    /// makes them durable enough that a subsequent `commit` cannot fail for
    /// content reasons.
    fn prepare(&self) -> Result<()>;

    /// Publishes all staged mutations atomically. Leaves the handle open.
    fn commit(&self) -> Result<()>;

    /// Discards staged mutations and closes the handle, releasing the shard's
    /// exclusive write lock.
    fn rollback(&self) -> Result<()>;
}
