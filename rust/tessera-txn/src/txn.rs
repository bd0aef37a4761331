//! The transaction coordinator.
//!
//! [`IndexTxn`] owns one unit-of-work against the sharded index. CRUD calls
//! may arrive from any number of application threads while the transaction is
//! `Active`; each call routes to its target shards through the injected
//! [`ShardResolver`] and lazily opens the shard's write handle on first touch.
//! Finalization (`prepare`, `commit`, `rollback`, `flush_commit`) fans the
//! per-shard work out under the engine's concurrency policy and is serialized
//! with respect to itself: only one finalization call runs at a time.
//!
//! A coordinator is single-use. Once it reaches `Committed` or `RolledBack`
//! (or a commit-phase failure leaves a shard indeterminate) the instance must
//! be discarded; the session layer constructs a new one per unit-of-work.

use std::sync::{Arc, Mutex, RwLock};

use ahash::AHashMap;
use log::{debug, warn};
use tessera_common::{Result, error::Error};
use tessera_index_core::{
    config::ShardSetConfig,
    directory::ShardDirectory,
    model::{EntryKey, Resource, ShardName, ShardScope, TermQuery},
    policy::EnginePolicy,
    resolver::ShardResolver,
    writer::ShardWriter,
};
use tessera_workflow::FanOut;

use crate::lock_table::ShardLockTable;

/// Unit-of-work state.
///
/// ```text
/// Active --begin--> Active (no-op: writers open lazily, not eagerly)
/// Active --prepare()--> Prepared | fails -> Active
/// Active|Prepared --commit(one_phase)--> Committed
/// Active|Prepared --rollback()--> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Preparing,
    Prepared,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
}

impl TxnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxnState::Committed | TxnState::RolledBack)
    }
}

/// Capabilities and configuration for one coordinator instance.
///
/// All capabilities are selected once at engine startup and shared across
/// units of work; the coordinator itself is constructed fresh per
/// unit-of-work.
#[derive(Clone)]
pub struct TxnParams {
    /// Writer factory, lock state and committed-state reads.
    pub directory: Arc<dyn ShardDirectory>,

    /// Routing of resources, keys and queries onto shards.
    pub resolver: Arc<dyn ShardResolver>,

    /// Finalization concurrency policy and commit notifications.
    pub policy: Arc<dyn EnginePolicy>,

    /// The complete, statically-known shard set.
    pub config: ShardSetConfig,
}

/// Transaction coordinator for one unit-of-work over the sharded index.
pub struct IndexTxn {
    directory: Arc<dyn ShardDirectory>,
    resolver: Arc<dyn ShardResolver>,
    policy: Arc<dyn EnginePolicy>,
    lock_table: ShardLockTable,
    /// Dirty set: exactly the shards whose writer is currently open.
    writers: RwLock<AHashMap<ShardName, Arc<dyn ShardWriter>>>,
    state: Mutex<TxnState>,
    /// Serializes prepare/commit/rollback/flush_commit against each other.
    finalize: Mutex<()>,
}

impl IndexTxn {
    pub fn new(params: TxnParams) -> IndexTxn {
        let lock_table = ShardLockTable::new(params.config.shards().iter().cloned());
        IndexTxn {
            directory: params.directory,
            resolver: params.resolver,
            policy: params.policy,
            lock_table,
            writers: RwLock::new(AHashMap::new()),
            state: Mutex::new(TxnState::Active),
            finalize: Mutex::new(()),
        }
    }

    /// Current unit-of-work state.
    pub fn state(&self) -> TxnState {
        *self.state.lock().expect("txn state")
    }

    /// Shards whose writer is currently open, sorted by name.
    pub fn dirty_shards(&self) -> Vec<ShardName> {
        let mut shards: Vec<ShardName> = self
            .writers
            .read()
            .expect("writers")
            .keys()
            .cloned()
            .collect();
        shards.sort();
        shards
    }

    /// Marks the start of the unit-of-work. A no-op: writers open lazily on
    /// first touch, not eagerly.
    pub fn begin(&self) -> Result<()> {
        self.ensure_active("begin")
    }

    /// Stages a new entry on the resource's shard.
    pub fn create(&self, resource: &Resource) -> Result<()> {
        self.ensure_active("create")?;
        let shard = self.resolver.resolve(resource)?;
        let writer = self.writer_for(&shard)?;
        writer
            .create(resource)
            .map_err(|e| Error::shard_op(shard.as_str(), "create", e))
    }

    /// Stages replacement of the entry with the resource's key.
    pub fn update(&self, resource: &Resource) -> Result<()> {
        self.ensure_active("update")?;
        let shard = self.resolver.resolve(resource)?;
        let writer = self.writer_for(&shard)?;
        writer
            .update(resource)
            .map_err(|e| Error::shard_op(shard.as_str(), "update", e))
    }

    /// Stages removal of the entry with the given key.
    pub fn delete(&self, key: &EntryKey) -> Result<()> {
        self.ensure_active("delete")?;
        let shard = self.resolver.resolve_key(key)?;
        let writer = self.writer_for(&shard)?;
        writer
            .delete(key)
            .map_err(|e| Error::shard_op(shard.as_str(), "delete", e))
    }

    /// Stages removal of every matching entry across the shards the query
    /// could touch.
    ///
    /// Best effort across shards, fail loud once: a failure on one shard does
    /// not prevent attempting the others, and the first failure is re-raised
    /// after every in-scope shard has been attempted.
    pub fn delete_by_query(&self, query: &TermQuery, scope: &ShardScope) -> Result<()> {
        self.ensure_active("delete_by_query")?;
        let shards = self.resolver.resolve_query(query, scope)?;
        let mut first_failure = None;
        for shard in shards {
            let attempt = self.writer_for(&shard).and_then(|writer| {
                writer
                    .delete_by_query(query)
                    .map_err(|e| Error::shard_op(shard.as_str(), "delete_by_query", e))
            });
            if let Err(err) = attempt {
                warn!("delete_by_query failed on shard '{shard}': {err}");
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Looks up one committed entry. Reads pass through to the engine and do
    /// not participate in transactional state: mutations staged in this
    /// unit-of-work are invisible until committed.
    pub fn find(&self, key: &EntryKey) -> Result<Option<Resource>> {
        let shard = self.resolver.resolve_key(key)?;
        self.directory.find(&shard, key)
    }

    /// Runs a query against committed state. A read passthrough, like
    /// [`find`](Self::find).
    pub fn search(&self, query: &TermQuery, scope: &ShardScope) -> Result<Vec<Resource>> {
        let shards = self.resolver.resolve_query(query, scope)?;
        self.directory.search(&shards, query)
    }

    /// First phase of a two-phase commit over the dirty set.
    ///
    /// On failure the transaction returns to `Active`: the caller may retry
    /// or roll back. Shards other than the failed one are left exactly as the
    /// runner's bail-out policy leaves them (some may have prepared).
    pub fn prepare(&self) -> Result<()> {
        let _guard = self.finalize.lock().expect("finalize");
        self.prepare_locked()
    }

    /// Commits the unit-of-work.
    ///
    /// With `one_phase`, the prepare phase runs internally first; if it
    /// fails, a best-effort rollback is attempted (its own failure is logged
    /// and swallowed) and the original prepare error is re-raised. Without
    /// `one_phase`, the caller is expected to have called
    /// [`prepare`](Self::prepare) already.
    ///
    /// A failure in the commit phase itself leaves the failing shard in an
    /// engine-defined indeterminate state; the error is surfaced, nothing is
    /// retried, and the coordinator must be discarded.
    pub fn commit(&self, one_phase: bool) -> Result<()> {
        let _guard = self.finalize.lock().expect("finalize");
        match self.state() {
            TxnState::Active => {
                if one_phase {
                    if let Err(prepare_err) = self.prepare_locked() {
                        if let Err(rollback_err) = self.rollback_locked() {
                            warn!(
                                "rollback after failed one-phase prepare also failed: \
                                 {rollback_err}"
                            );
                        }
                        return Err(prepare_err);
                    }
                }
            }
            TxnState::Prepared => {}
            state => {
                return Err(Error::invalid_operation(format!(
                    "commit in state {state:?}"
                )));
            }
        }
        self.commit_locked()
    }

    /// Rolls the unit-of-work back. Exhaustive, never fail-fast: every dirty
    /// shard is attempted and untracked unconditionally, and at most one
    /// error (naming the first offending shard) is raised afterwards.
    pub fn rollback(&self) -> Result<()> {
        let _guard = self.finalize.lock().expect("finalize");
        self.rollback_locked()
    }

    /// Mid-transaction visibility checkpoint: commits the writers of the
    /// dirty shards within `scope` (empty scope means the full dirty set)
    /// without closing them or ending the transaction. Shards outside the
    /// intersection are untouched and remain open and dirty.
    pub fn flush_commit(&self, scope: &ShardScope) -> Result<()> {
        let _guard = self.finalize.lock().expect("finalize");
        self.ensure_active("flush_commit")?;
        let allowed = self.resolver.resolve_scope(scope)?;
        let writers: Vec<Arc<dyn ShardWriter>> = self
            .dirty_writers()
            .into_iter()
            .filter(|w| match &allowed {
                Some(shards) => shards.contains(w.shard()),
                None => true,
            })
            .collect();
        debug!("flush_commit over {} shard(s)", writers.len());
        self.fan_out(writers, |w| w.commit(), |s, e| {
            Error::commit_failed(s.as_str(), e)
        })
    }

    fn ensure_active(&self, op: &str) -> Result<()> {
        let state = self.state();
        if state == TxnState::Active {
            Ok(())
        } else {
            Err(Error::invalid_operation(format!("{op} in state {state:?}")))
        }
    }

    fn set_state(&self, next: TxnState) {
        *self.state.lock().expect("txn state") = next;
    }

    /// Returns the open writer for the shard, opening it on first touch.
    ///
    /// Double-checked acquisition: an unguarded map lookup first, then the
    /// shard's table lock with a re-check underneath it, so that the
    /// external `open_writer` runs exactly once per shard per unit-of-work
    /// however many threads race on first touch. Different shards open fully
    /// in parallel.
    fn writer_for(&self, shard: &ShardName) -> Result<Arc<dyn ShardWriter>> {
        if let Some(writer) = self.writers.read().expect("writers").get(shard) {
            return Ok(writer.clone());
        }
        self.lock_table.with_shard_lock(shard, || {
            // Another thread may have finished opening while this one waited
            // for the shard lock.
            if let Some(writer) = self.writers.read().expect("writers").get(shard) {
                return Ok(writer.clone());
            }
            let writer = self
                .directory
                .open_writer(shard)
                .map_err(|e| Error::open_failure(shard.as_str(), e))?;
            self.writers
                .write()
                .expect("writers")
                .insert(shard.clone(), writer.clone());
            debug!("shard '{shard}': writer opened");
            Ok(writer)
        })?
    }

    /// Snapshot of the open writers, sorted by shard name so that fan-out
    /// submission order (and therefore sequential failure reporting) is
    /// deterministic.
    fn dirty_writers(&self) -> Vec<Arc<dyn ShardWriter>> {
        let mut writers: Vec<Arc<dyn ShardWriter>> = self
            .writers
            .read()
            .expect("writers")
            .values()
            .cloned()
            .collect();
        writers.sort_by(|a, b| a.shard().cmp(b.shard()));
        writers
    }

    /// Drains the dirty set, dropping every handle. Returns the shard names,
    /// sorted.
    fn untrack_all(&self) -> Vec<ShardName> {
        let drained = std::mem::take(&mut *self.writers.write().expect("writers"));
        let mut shards: Vec<ShardName> = drained.keys().cloned().collect();
        shards.sort();
        shards
    }

    /// Runs `op` against every given writer under the engine's finalization
    /// policy, wrapping the lowest-index failure with `wrap`.
    fn fan_out(
        &self,
        writers: Vec<Arc<dyn ShardWriter>>,
        op: impl Fn(&dyn ShardWriter) -> Result<()> + Send + Sync,
        wrap: impl Fn(&ShardName, Error) -> Error + Send + Sync,
    ) -> Result<()> {
        let runner = if self.policy.supports_concurrent_commits() {
            FanOut::bounded(self.policy.max_concurrency(), 1)
        } else {
            FanOut::sequential()
        };
        let op = &op;
        let wrap = &wrap;
        runner.run(writers.into_iter().map(|writer| {
            move || {
                op(writer.as_ref()).map_err(|e| wrap(writer.shard(), e))
            }
        }))
    }

    fn prepare_locked(&self) -> Result<()> {
        self.ensure_active("prepare")?;
        let writers = self.dirty_writers();
        if writers.is_empty() {
            self.set_state(TxnState::Prepared);
            return Ok(());
        }
        self.set_state(TxnState::Preparing);
        debug!("preparing {} shard(s)", writers.len());
        let result = self.fan_out(writers, |w| w.prepare(), |s, e| {
            Error::prepare_failed(s.as_str(), e)
        });
        match result {
            Ok(()) => {
                self.set_state(TxnState::Prepared);
                Ok(())
            }
            Err(err) => {
                self.set_state(TxnState::Active);
                Err(err)
            }
        }
    }

    fn commit_locked(&self) -> Result<()> {
        self.set_state(TxnState::Committing);
        let writers = self.dirty_writers();
        debug!("committing {} shard(s)", writers.len());
        self.fan_out(writers, |w| w.commit(), |s, e| {
            Error::commit_failed(s.as_str(), e)
        })?;
        let shards = self.untrack_all();
        for shard in &shards {
            self.policy.notify_committed(shard);
        }
        self.set_state(TxnState::Committed);
        debug!("committed {} shard(s)", shards.len());
        Ok(())
    }

    fn rollback_locked(&self) -> Result<()> {
        match self.state() {
            TxnState::Active | TxnState::Prepared => {}
            state => {
                return Err(Error::invalid_operation(format!(
                    "rollback in state {state:?}"
                )));
            }
        }
        self.set_state(TxnState::RollingBack);

        let mut entries: Vec<(ShardName, Arc<dyn ShardWriter>)> = self
            .writers
            .write()
            .expect("writers")
            .drain()
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        // Every shard is attempted unconditionally; nothing in this loop may
        // abort the remaining cleanup.
        let mut first_failure: Option<Error> = None;
        for (shard, writer) in entries {
            match writer.rollback() {
                Ok(()) => {}
                // Idempotent abort: an already-closed writer counts as
                // rolled back.
                Err(err) if err.is_writer_closed() => {}
                Err(err) => {
                    warn!("shard '{shard}': rollback failed: {err}");
                    self.recover_lock_state(&shard);
                    if first_failure.is_none() {
                        first_failure = Some(Error::rollback_failed(shard.as_str(), err));
                    }
                }
            }
            // The handle is untracked regardless of the outcome.
            drop(writer);
        }

        self.set_state(TxnState::RolledBack);
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Defensive recovery after a failed per-shard rollback: if the shard's
    /// storage is left locked, force-clear the lock. Failures here are logged
    /// and never block the rest of rollback.
    fn recover_lock_state(&self, shard: &ShardName) {
        match self.directory.is_locked(shard) {
            Ok(true) => match self.directory.force_unlock(shard) {
                Ok(()) => debug!("shard '{shard}': cleared stale write lock"),
                Err(err) => {
                    let err = Error::lock_state(shard.as_str(), err);
                    warn!("{err}");
                }
            },
            Ok(false) => {}
            Err(err) => {
                warn!("shard '{shard}': could not inspect lock state: {err}");
            }
        }
    }
}
