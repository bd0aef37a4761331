//! Static shard-set configuration.

use ahash::AHashSet;

use tessera_common::{Result, verify_arg};

use crate::model::ShardName;

/// The complete, statically-known list of shards, fixed at engine startup.
///
/// The coordinator sizes its per-shard lock table from this list; a shard name
/// outside it is rejected everywhere.
#[derive(Debug, Clone)]
pub struct ShardSetConfig {
    shards: Vec<ShardName>,
}

impl ShardSetConfig {
    /// Builds the configuration from the full shard list. The list must be
    /// non-empty and free of duplicates.
    pub fn new(shards: impl IntoIterator<Item = impl Into<ShardName>>) -> Result<ShardSetConfig> {
        let shards: Vec<ShardName> = shards.into_iter().map(Into::into).collect();
        verify_arg!(shards, !shards.is_empty());
        let unique: AHashSet<&ShardName> = shards.iter().collect();
        verify_arg!(shards, unique.len() == shards.len());
        Ok(ShardSetConfig { shards })
    }

    pub fn shards(&self) -> &[ShardName] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn contains(&self, shard: &ShardName) -> bool {
        self.shards.contains(shard)
    }
}
