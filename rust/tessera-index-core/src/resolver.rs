//! Routing of resources, keys and queries onto shard names.

use tessera_common::Result;

use crate::model::{EntryKey, Resource, ShardName, ShardScope, TermQuery};

/// Maps logical entities onto the shards they live in.
///
/// Injected as a pure routing capability: how a resource's shard is computed
/// from its alias and id is entirely the resolver's business, which keeps the
/// coordinator decoupled from any particular mapping mechanism.
pub trait ShardResolver: Send + Sync + 'static {
    /// Shard holding the given resource.
    fn resolve(&self, resource: &Resource) -> Result<ShardName> {
        self.resolve_key(&resource.key)
    }

    /// Shard holding the entry with the given key.
    fn resolve_key(&self, key: &EntryKey) -> Result<ShardName>;

    /// The set of shards a query could match, intersected with the scope.
    fn resolve_query(&self, query: &TermQuery, scope: &ShardScope) -> Result<Vec<ShardName>>;

    /// The set of shards a scope names, or `None` when the scope places no
    /// restriction.
    fn resolve_scope(&self, scope: &ShardScope) -> Result<Option<Vec<ShardName>>>;
}
