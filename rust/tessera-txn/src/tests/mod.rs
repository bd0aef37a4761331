//! Coordinator integration tests, driven against the scripted fault-injection
//! engine (`tessera-testkit`) and the memory reference engine
//! (`tessera-store`).

mod checkpoint;

use std::sync::Arc;

use tessera_index_core::config::ShardSetConfig;
use tessera_store::{AliasResolver, MemoryDirectory};
use tessera_testkit::{ScriptedDirectory, TestPolicy};

use crate::txn::{IndexTxn, TxnParams};

/// Coordinator over a scripted directory, with handles kept for scripting
/// failures and reading call counters.
pub(crate) struct ScriptedFixture {
    pub directory: Arc<ScriptedDirectory>,
    pub policy: Arc<TestPolicy>,
    pub txn: IndexTxn,
}

/// Builds a scripted fixture from `(alias, shard)` routes.
pub(crate) fn scripted_fixture(routes: &[(&str, &str)], policy: TestPolicy) -> ScriptedFixture {
    let mut resolver = AliasResolver::new();
    let mut shards: Vec<&str> = Vec::new();
    for (alias, shard) in routes {
        resolver = resolver.with_route(*alias, *shard);
        if !shards.contains(shard) {
            shards.push(shard);
        }
    }
    let directory = Arc::new(ScriptedDirectory::new(shards.iter().copied()));
    let policy = Arc::new(policy);
    let txn = IndexTxn::new(TxnParams {
        directory: directory.clone(),
        resolver: Arc::new(resolver),
        policy: policy.clone(),
        config: ShardSetConfig::new(shards).unwrap(),
    });
    ScriptedFixture {
        directory,
        policy,
        txn,
    }
}

/// Coordinator over the memory engine, for visibility-oriented tests.
pub(crate) struct MemoryFixture {
    pub directory: Arc<MemoryDirectory>,
    pub resolver: Arc<AliasResolver>,
    pub config: ShardSetConfig,
    pub policy: Arc<TestPolicy>,
}

impl MemoryFixture {
    /// Starts a fresh unit-of-work over the shared engine.
    pub fn begin_txn(&self) -> IndexTxn {
        IndexTxn::new(TxnParams {
            directory: self.directory.clone(),
            resolver: self.resolver.clone(),
            policy: self.policy.clone(),
            config: self.config.clone(),
        })
    }
}

/// Builds a memory fixture from `(alias, shard)` routes.
pub(crate) fn memory_fixture(routes: &[(&str, &str)], policy: TestPolicy) -> MemoryFixture {
    let mut resolver = AliasResolver::new();
    let mut shards: Vec<&str> = Vec::new();
    for (alias, shard) in routes {
        resolver = resolver.with_route(*alias, *shard);
        if !shards.contains(shard) {
            shards.push(shard);
        }
    }
    MemoryFixture {
        directory: Arc::new(MemoryDirectory::new(shards.iter().copied())),
        resolver: Arc::new(resolver),
        config: ShardSetConfig::new(shards).unwrap(),
        policy: Arc::new(policy),
    }
}
