//! Standard routing strategies.
//!
//! Two resolvers cover the common deployments: [`UniformResolver`] spreads
//! entries of every alias across the whole shard set by key hash, and
//! [`AliasResolver`] pins each alias to one shard through an explicit routing
//! table.

use ahash::AHashMap;
use xxhash_rust::xxh3::xxh3_64;

use tessera_common::{Result, error::Error};
use tessera_index_core::{
    model::{EntryKey, ShardName, ShardScope, TermQuery},
    resolver::ShardResolver,
};

/// Routes entries by hashing their key uniformly over the shard set.
///
/// Entries of any alias end up spread across all shards, so alias-level
/// scopes place no shard-level restriction and queries fan out to the whole
/// set unless an explicit shard scope narrows them.
pub struct UniformResolver {
    shards: Vec<ShardName>,
}

impl UniformResolver {
    pub fn new(shards: impl IntoIterator<Item = impl Into<ShardName>>) -> UniformResolver {
        UniformResolver {
            shards: shards.into_iter().map(Into::into).collect(),
        }
    }

    fn route(&self, key: &EntryKey) -> ShardName {
        let mut bytes = Vec::with_capacity(key.alias.len() + key.id.len() + 1);
        bytes.extend_from_slice(key.alias.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(key.id.as_bytes());
        let slot = (xxh3_64(&bytes) % self.shards.len() as u64) as usize;
        self.shards[slot].clone()
    }
}

impl ShardResolver for UniformResolver {
    fn resolve_key(&self, key: &EntryKey) -> Result<ShardName> {
        if self.shards.is_empty() {
            return Err(Error::invalid_operation("resolve over empty shard set"));
        }
        Ok(self.route(key))
    }

    fn resolve_query(&self, query: &TermQuery, scope: &ShardScope) -> Result<Vec<ShardName>> {
        let _ = query;
        Ok(match self.resolve_scope(scope)? {
            Some(shards) => shards,
            None => self.shards.clone(),
        })
    }

    fn resolve_scope(&self, scope: &ShardScope) -> Result<Option<Vec<ShardName>>> {
        Ok(match scope {
            ShardScope::All | ShardScope::Aliases(_) => None,
            ShardScope::Shards(shards) => Some(shards.clone()),
        })
    }
}

/// Routes each alias to one shard through an explicit table.
pub struct AliasResolver {
    routes: AHashMap<String, ShardName>,
}

impl AliasResolver {
    pub fn new() -> AliasResolver {
        AliasResolver {
            routes: AHashMap::new(),
        }
    }

    /// Adds a route from `alias` to `shard`.
    pub fn with_route(
        mut self,
        alias: impl Into<String>,
        shard: impl Into<ShardName>,
    ) -> AliasResolver {
        self.routes.insert(alias.into(), shard.into());
        self
    }

    fn shard_of(&self, alias: &str) -> Result<ShardName> {
        self.routes
            .get(alias)
            .cloned()
            .ok_or_else(|| Error::invalid_arg("alias", format!("no shard routes '{alias}'")))
    }

    fn all_shards(&self) -> Vec<ShardName> {
        let mut shards: Vec<ShardName> = self.routes.values().cloned().collect();
        shards.sort();
        shards.dedup();
        shards
    }
}

impl Default for AliasResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardResolver for AliasResolver {
    fn resolve_key(&self, key: &EntryKey) -> Result<ShardName> {
        self.shard_of(&key.alias)
    }

    fn resolve_query(&self, query: &TermQuery, scope: &ShardScope) -> Result<Vec<ShardName>> {
        let candidates = if query.aliases.is_empty() {
            self.all_shards()
        } else {
            let mut shards = Vec::new();
            for alias in &query.aliases {
                shards.push(self.shard_of(alias)?);
            }
            shards.sort();
            shards.dedup();
            shards
        };
        Ok(match self.resolve_scope(scope)? {
            Some(allowed) => candidates
                .into_iter()
                .filter(|s| allowed.contains(s))
                .collect(),
            None => candidates,
        })
    }

    fn resolve_scope(&self, scope: &ShardScope) -> Result<Option<Vec<ShardName>>> {
        Ok(match scope {
            ShardScope::All => None,
            ShardScope::Aliases(aliases) => {
                let mut shards = Vec::new();
                for alias in aliases {
                    shards.push(self.shard_of(alias)?);
                }
                shards.sort();
                shards.dedup();
                Some(shards)
            }
            ShardScope::Shards(shards) => Some(shards.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_routing_is_stable() {
        let resolver = UniformResolver::new(["a", "b", "c"]);
        let key = EntryKey::new("user", "42");
        let first = resolver.resolve_key(&key).unwrap();
        for _ in 0..10 {
            assert_eq!(resolver.resolve_key(&key).unwrap(), first);
        }
    }

    #[test]
    fn test_uniform_query_fans_out() {
        let resolver = UniformResolver::new(["a", "b"]);
        let shards = resolver
            .resolve_query(&TermQuery::new("x"), &ShardScope::All)
            .unwrap();
        assert_eq!(shards.len(), 2);

        let narrowed = resolver
            .resolve_query(&TermQuery::new("x"), &ShardScope::shards(["b"]))
            .unwrap();
        assert_eq!(narrowed, vec![ShardName::new("b")]);
    }

    #[test]
    fn test_alias_routing() {
        let resolver = AliasResolver::new()
            .with_route("user", "people")
            .with_route("order", "commerce");

        assert_eq!(
            resolver.resolve_key(&EntryKey::new("user", "1")).unwrap(),
            ShardName::new("people")
        );
        assert!(resolver.resolve_key(&EntryKey::new("ghost", "1")).is_err());
    }

    #[test]
    fn test_alias_query_resolution() {
        let resolver = AliasResolver::new()
            .with_route("user", "people")
            .with_route("admin", "people")
            .with_route("order", "commerce");

        let shards = resolver
            .resolve_query(&TermQuery::new("x").with_alias("user"), &ShardScope::All)
            .unwrap();
        assert_eq!(shards, vec![ShardName::new("people")]);

        let all = resolver
            .resolve_query(&TermQuery::new("x"), &ShardScope::All)
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_alias_scope_resolution() {
        let resolver = AliasResolver::new()
            .with_route("user", "people")
            .with_route("order", "commerce");

        let scoped = resolver
            .resolve_scope(&ShardScope::aliases(["order"]))
            .unwrap();
        assert_eq!(scoped, Some(vec![ShardName::new("commerce")]));
        assert_eq!(resolver.resolve_scope(&ShardScope::All).unwrap(), None);
    }
}
