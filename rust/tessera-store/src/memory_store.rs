//! Memory-backed shard directory and writer.
//!
//! Each shard is a cell holding its committed entries plus an exclusive-lock
//! flag. Writers stage mutations privately and publish them atomically on
//! `commit`; the lock is taken by `open_writer` and released when the writer
//! rolls back or is dropped, mirroring the lock lifecycle of a file-based
//! engine.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use ahash::AHashMap;
use log::debug;
use tessera_common::{Result, error::Error};
use tessera_index_core::{
    directory::ShardDirectory,
    model::{EntryKey, Resource, ShardName, TermQuery},
    writer::ShardWriter,
};

/// Committed state and lock flag of one shard.
struct ShardCell {
    name: ShardName,
    entries: Mutex<AHashMap<EntryKey, Resource>>,
    locked: AtomicBool,
}

impl ShardCell {
    fn release_lock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }
}

/// In-memory implementation of [`ShardDirectory`].
pub struct MemoryDirectory {
    shards: AHashMap<ShardName, Arc<ShardCell>>,
}

impl MemoryDirectory {
    /// Creates a directory serving the given shard set, all shards empty and
    /// unlocked.
    pub fn new(shards: impl IntoIterator<Item = impl Into<ShardName>>) -> MemoryDirectory {
        let shards = shards
            .into_iter()
            .map(Into::into)
            .map(|name| {
                let cell = Arc::new(ShardCell {
                    name: name.clone(),
                    entries: Mutex::new(AHashMap::new()),
                    locked: AtomicBool::new(false),
                });
                (name, cell)
            })
            .collect();
        MemoryDirectory { shards }
    }

    fn cell(&self, shard: &ShardName) -> Result<&Arc<ShardCell>> {
        self.shards
            .get(shard)
            .ok_or_else(|| Error::invalid_arg("shard", format!("unknown shard '{shard}'")))
    }

    /// Number of committed entries in one shard.
    pub fn entry_count(&self, shard: &ShardName) -> Result<usize> {
        Ok(self.cell(shard)?.entries.lock().expect("entries").len())
    }
}

impl ShardDirectory for MemoryDirectory {
    fn open_writer(&self, shard: &ShardName) -> Result<Arc<dyn ShardWriter>> {
        let cell = self.cell(shard)?;
        if cell
            .locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::invalid_operation(format!(
                "shard '{shard}' is write-locked by another writer"
            )));
        }
        debug!("opened writer for shard '{shard}'");
        Ok(Arc::new(MemoryWriter {
            cell: cell.clone(),
            state: Mutex::new(WriterState::default()),
        }))
    }

    fn is_locked(&self, shard: &ShardName) -> Result<bool> {
        Ok(self.cell(shard)?.locked.load(Ordering::SeqCst))
    }

    fn force_unlock(&self, shard: &ShardName) -> Result<()> {
        self.cell(shard)?.release_lock();
        Ok(())
    }

    fn find(&self, shard: &ShardName, key: &EntryKey) -> Result<Option<Resource>> {
        let cell = self.cell(shard)?;
        let entries = cell.entries.lock().expect("entries");
        Ok(entries.get(key).cloned())
    }

    fn search(&self, shards: &[ShardName], query: &TermQuery) -> Result<Vec<Resource>> {
        let mut hits = Vec::new();
        for shard in shards {
            let cell = self.cell(shard)?;
            let entries = cell.entries.lock().expect("entries");
            hits.extend(entries.values().filter(|r| query.matches(r)).cloned());
        }
        Ok(hits)
    }
}

enum StagedOp {
    Put(Resource),
    Delete(EntryKey),
    DeleteByQuery(TermQuery),
}

#[derive(Default)]
struct WriterState {
    staged: Vec<StagedOp>,
    closed: bool,
}

/// Write handle over one [`MemoryDirectory`] shard.
///
/// Mutations accumulate in a private staging buffer and become visible to
/// readers only when `commit` publishes them into the shard cell.
pub struct MemoryWriter {
    cell: Arc<ShardCell>,
    state: Mutex<WriterState>,
}

impl MemoryWriter {
    fn stage(&self, op: StagedOp) -> Result<()> {
        let mut state = self.state.lock().expect("writer state");
        if state.closed {
            return Err(Error::writer_closed(self.cell.name.as_str()));
        }
        state.staged.push(op);
        Ok(())
    }
}

impl ShardWriter for MemoryWriter {
    fn shard(&self) -> &ShardName {
        &self.cell.name
    }

    fn create(&self, resource: &Resource) -> Result<()> {
        self.stage(StagedOp::Put(resource.clone()))
    }

    fn update(&self, resource: &Resource) -> Result<()> {
        self.stage(StagedOp::Put(resource.clone()))
    }

    fn delete(&self, key: &EntryKey) -> Result<()> {
        self.stage(StagedOp::Delete(key.clone()))
    }

    fn delete_by_query(&self, query: &TermQuery) -> Result<()> {
        self.stage(StagedOp::DeleteByQuery(query.clone()))
    }

    fn prepare(&self) -> Result<()> {
        let state = self.state.lock().expect("writer state");
        if state.closed {
            return Err(Error::writer_closed(self.cell.name.as_str()));
        }
        for op in &state.staged {
            if let StagedOp::Put(resource) = op {
                if resource.key.alias.is_empty() || resource.key.id.is_empty() {
                    return Err(Error::invalid_arg(
                        "resource",
                        format!("incomplete entry key '{}'", resource.key),
                    ));
                }
            }
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().expect("writer state");
        if state.closed {
            // Nothing staged on a closed handle is a harmless re-commit.
            if state.staged.is_empty() {
                return Ok(());
            }
            return Err(Error::writer_closed(self.cell.name.as_str()));
        }
        if state.staged.is_empty() {
            return Ok(());
        }
        let staged = std::mem::take(&mut state.staged);
        let count = staged.len();
        let mut entries = self.cell.entries.lock().expect("entries");
        for op in staged {
            match op {
                StagedOp::Put(resource) => {
                    entries.insert(resource.key.clone(), resource);
                }
                StagedOp::Delete(key) => {
                    entries.remove(&key);
                }
                StagedOp::DeleteByQuery(query) => {
                    entries.retain(|_, r| !query.matches(r));
                }
            }
        }
        debug!(
            "shard '{}': published {count} staged operations",
            self.cell.name
        );
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock().expect("writer state");
        if state.closed {
            return Err(Error::writer_closed(self.cell.name.as_str()));
        }
        state.staged.clear();
        state.closed = true;
        self.cell.release_lock();
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let state = self.state.get_mut().expect("writer state");
        if !state.closed {
            state.closed = true;
            self.cell.release_lock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<ShardName> {
        list.iter().map(|s| ShardName::new(*s)).collect()
    }

    #[test]
    fn test_commit_publishes_staged_entries() {
        let dir = MemoryDirectory::new(["a"]);
        let shard = ShardName::new("a");
        let writer = dir.open_writer(&shard).unwrap();

        writer
            .create(&Resource::new("user", "1").with_field("name", "ada"))
            .unwrap();
        assert_eq!(dir.entry_count(&shard).unwrap(), 0);

        writer.commit().unwrap();
        assert_eq!(dir.entry_count(&shard).unwrap(), 1);
        let found = dir.find(&shard, &EntryKey::new("user", "1")).unwrap();
        assert_eq!(found.unwrap().field("name"), Some("ada"));
    }

    #[test]
    fn test_rollback_discards_staged_entries() {
        let dir = MemoryDirectory::new(["a"]);
        let shard = ShardName::new("a");
        let writer = dir.open_writer(&shard).unwrap();

        writer.create(&Resource::new("user", "1")).unwrap();
        writer.rollback().unwrap();
        assert_eq!(dir.entry_count(&shard).unwrap(), 0);
        assert!(!dir.is_locked(&shard).unwrap());
    }

    #[test]
    fn test_rollback_on_closed_writer_reports_closed() {
        let dir = MemoryDirectory::new(["a"]);
        let shard = ShardName::new("a");
        let writer = dir.open_writer(&shard).unwrap();

        writer.rollback().unwrap();
        let err = writer.rollback().unwrap_err();
        assert!(err.is_writer_closed());
    }

    #[test]
    fn test_commit_with_nothing_staged_is_noop() {
        let dir = MemoryDirectory::new(["a"]);
        let shard = ShardName::new("a");
        let writer = dir.open_writer(&shard).unwrap();

        writer.create(&Resource::new("user", "1")).unwrap();
        writer.commit().unwrap();
        // Checkpointed handle stays open; re-commit with an empty buffer
        // must not fail or duplicate anything.
        writer.commit().unwrap();
        assert_eq!(dir.entry_count(&shard).unwrap(), 1);
    }

    #[test]
    fn test_open_writer_takes_exclusive_lock() {
        let dir = MemoryDirectory::new(["a"]);
        let shard = ShardName::new("a");

        let writer = dir.open_writer(&shard).unwrap();
        assert!(dir.is_locked(&shard).unwrap());
        assert!(dir.open_writer(&shard).is_err());

        drop(writer);
        assert!(!dir.is_locked(&shard).unwrap());
        assert!(dir.open_writer(&shard).is_ok());
    }

    #[test]
    fn test_force_unlock_clears_stale_lock() {
        let dir = MemoryDirectory::new(["a"]);
        let shard = ShardName::new("a");

        let writer = dir.open_writer(&shard).unwrap();
        dir.force_unlock(&shard).unwrap();
        assert!(!dir.is_locked(&shard).unwrap());
        // The stranded writer is still usable but the lock is gone.
        drop(writer);
        assert!(!dir.is_locked(&shard).unwrap());
    }

    #[test]
    fn test_delete_by_query_on_commit() {
        let dir = MemoryDirectory::new(["a"]);
        let shard = ShardName::new("a");
        let writer = dir.open_writer(&shard).unwrap();

        writer
            .create(&Resource::new("user", "1").with_field("bio", "engines"))
            .unwrap();
        writer
            .create(&Resource::new("user", "2").with_field("bio", "looms"))
            .unwrap();
        writer.commit().unwrap();

        writer
            .delete_by_query(&TermQuery::new("bio:engines"))
            .unwrap();
        writer.commit().unwrap();

        let hits = dir
            .search(&names(&["a"]), &TermQuery::new("bio:looms"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(dir.entry_count(&shard).unwrap(), 1);
    }

    #[test]
    fn test_search_merges_shards() {
        let dir = MemoryDirectory::new(["a", "b"]);
        for (shard, id) in [("a", "1"), ("b", "2")] {
            let shard = ShardName::new(shard);
            let writer = dir.open_writer(&shard).unwrap();
            writer
                .create(&Resource::new("user", id).with_field("kind", "common"))
                .unwrap();
            writer.commit().unwrap();
            drop(writer);
        }

        let hits = dir
            .search(&names(&["a", "b"]), &TermQuery::new("kind:common"))
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_prepare_rejects_incomplete_key() {
        let dir = MemoryDirectory::new(["a"]);
        let writer = dir.open_writer(&ShardName::new("a")).unwrap();
        writer.create(&Resource::new("user", "")).unwrap();
        assert!(writer.prepare().is_err());
    }
}
