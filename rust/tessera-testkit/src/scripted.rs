//! Scripted shard engine.
//!
//! Every shard carries a [`FailurePlan`] deciding which contract methods fail,
//! and a set of call counters. Injected failures surface as I/O errors except
//! where the plan asks for the distinguished "writer already closed" report.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use ahash::AHashMap;
use tessera_common::{Result, error::Error};
use tessera_index_core::{
    directory::ShardDirectory,
    model::{EntryKey, Resource, ShardName, TermQuery},
    writer::ShardWriter,
};

/// Which operations fail on one scripted shard.
///
/// A failed rollback leaves the shard's lock stuck, so the coordinator's
/// recovery path (`is_locked` + `force_unlock`) has something real to clear;
/// `fail_force_unlock` then makes that recovery itself fail.
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    pub fail_open: bool,
    pub fail_ops: bool,
    pub fail_prepare: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    /// Rollback reports the writer as already closed instead of failing hard.
    pub rollback_reports_closed: bool,
    pub fail_force_unlock: bool,
}

/// Snapshot of the per-shard call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallCounts {
    pub opens: usize,
    pub ops: usize,
    pub prepares: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub unlock_attempts: usize,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    ops: AtomicUsize,
    prepares: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    unlock_attempts: AtomicUsize,
}

struct ScriptedCell {
    name: ShardName,
    plan: Mutex<FailurePlan>,
    counters: Counters,
    locked: AtomicBool,
}

impl ScriptedCell {
    fn plan(&self) -> FailurePlan {
        self.plan.lock().expect("plan").clone()
    }
}

fn injected(shard: &ShardName, op: &str) -> Error {
    Error::io(
        format!("{op} on shard '{shard}'"),
        std::io::Error::other("injected failure"),
    )
}

/// Shard engine with scripted per-shard failures and call accounting.
pub struct ScriptedDirectory {
    cells: AHashMap<ShardName, Arc<ScriptedCell>>,
}

impl ScriptedDirectory {
    pub fn new(shards: impl IntoIterator<Item = impl Into<ShardName>>) -> ScriptedDirectory {
        let cells = shards
            .into_iter()
            .map(Into::into)
            .map(|name| {
                let cell = Arc::new(ScriptedCell {
                    name: name.clone(),
                    plan: Mutex::new(FailurePlan::default()),
                    counters: Counters::default(),
                    locked: AtomicBool::new(false),
                });
                (name, cell)
            })
            .collect();
        ScriptedDirectory { cells }
    }

    fn cell(&self, shard: &ShardName) -> Result<&Arc<ScriptedCell>> {
        self.cells
            .get(shard)
            .ok_or_else(|| Error::invalid_arg("shard", format!("unknown shard '{shard}'")))
    }

    /// Edits the failure plan of one shard.
    ///
    /// # Panics
    ///
    /// Panics on an unknown shard name; scripting a shard that does not exist
    /// is a test bug.
    pub fn script(&self, shard: &str, edit: impl FnOnce(&mut FailurePlan)) {
        let cell = self
            .cells
            .get(shard)
            .unwrap_or_else(|| panic!("unknown scripted shard '{shard}'"));
        edit(&mut cell.plan.lock().expect("plan"));
    }

    /// Snapshot of the call counters of one shard.
    ///
    /// # Panics
    ///
    /// Panics on an unknown shard name.
    pub fn calls(&self, shard: &str) -> CallCounts {
        let cell = self
            .cells
            .get(shard)
            .unwrap_or_else(|| panic!("unknown scripted shard '{shard}'"));
        CallCounts {
            opens: cell.counters.opens.load(Ordering::SeqCst),
            ops: cell.counters.ops.load(Ordering::SeqCst),
            prepares: cell.counters.prepares.load(Ordering::SeqCst),
            commits: cell.counters.commits.load(Ordering::SeqCst),
            rollbacks: cell.counters.rollbacks.load(Ordering::SeqCst),
            unlock_attempts: cell.counters.unlock_attempts.load(Ordering::SeqCst),
        }
    }
}

impl ShardDirectory for ScriptedDirectory {
    fn open_writer(&self, shard: &ShardName) -> Result<Arc<dyn ShardWriter>> {
        let cell = self.cell(shard)?;
        cell.counters.opens.fetch_add(1, Ordering::SeqCst);
        if cell.plan().fail_open {
            return Err(injected(shard, "open"));
        }
        if cell
            .locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::invalid_operation(format!(
                "shard '{shard}' is write-locked"
            )));
        }
        Ok(Arc::new(ScriptedWriter {
            cell: cell.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn is_locked(&self, shard: &ShardName) -> Result<bool> {
        Ok(self.cell(shard)?.locked.load(Ordering::SeqCst))
    }

    fn force_unlock(&self, shard: &ShardName) -> Result<()> {
        let cell = self.cell(shard)?;
        cell.counters.unlock_attempts.fetch_add(1, Ordering::SeqCst);
        if cell.plan().fail_force_unlock {
            return Err(injected(shard, "force_unlock"));
        }
        cell.locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn find(&self, shard: &ShardName, _key: &EntryKey) -> Result<Option<Resource>> {
        self.cell(shard)?;
        Ok(None)
    }

    fn search(&self, _shards: &[ShardName], _query: &TermQuery) -> Result<Vec<Resource>> {
        Ok(Vec::new())
    }
}

struct ScriptedWriter {
    cell: Arc<ScriptedCell>,
    closed: AtomicBool,
}

impl ScriptedWriter {
    fn apply_op(&self, op: &str) -> Result<()> {
        self.cell.counters.ops.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::writer_closed(self.cell.name.as_str()));
        }
        if self.cell.plan().fail_ops {
            return Err(injected(&self.cell.name, op));
        }
        Ok(())
    }
}

impl ShardWriter for ScriptedWriter {
    fn shard(&self) -> &ShardName {
        &self.cell.name
    }

    fn create(&self, _resource: &Resource) -> Result<()> {
        self.apply_op("create")
    }

    fn update(&self, _resource: &Resource) -> Result<()> {
        self.apply_op("update")
    }

    fn delete(&self, _key: &EntryKey) -> Result<()> {
        self.apply_op("delete")
    }

    fn delete_by_query(&self, _query: &TermQuery) -> Result<()> {
        self.apply_op("delete_by_query")
    }

    fn prepare(&self) -> Result<()> {
        self.cell.counters.prepares.fetch_add(1, Ordering::SeqCst);
        if self.cell.plan().fail_prepare {
            return Err(injected(&self.cell.name, "prepare"));
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.cell.counters.commits.fetch_add(1, Ordering::SeqCst);
        if self.cell.plan().fail_commit {
            return Err(injected(&self.cell.name, "commit"));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.cell.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        let plan = self.cell.plan();
        if plan.rollback_reports_closed || self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::writer_closed(self.cell.name.as_str()));
        }
        if plan.fail_rollback {
            // Abort died halfway: the storage lock stays stuck until the
            // directory is asked to clear it.
            return Err(injected(&self.cell.name, "rollback"));
        }
        self.cell.locked.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for ScriptedWriter {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            self.cell.locked.store(false, Ordering::SeqCst);
        }
    }
}
