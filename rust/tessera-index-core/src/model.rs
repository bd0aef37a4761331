//! Resource data model shared by the coordinator and the storage engine.

use std::{borrow::Borrow, fmt, sync::Arc};

/// Name of one index shard (sub-index).
///
/// String identity, stable for the process lifetime. Shards are created by
/// configuration at startup and never created or destroyed by the transaction
/// coordinator. The name is interned behind an `Arc`, so clones are cheap and
/// suitable as map keys on hot paths.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardName(Arc<str>);

impl ShardName {
    pub fn new(name: impl Into<Arc<str>>) -> ShardName {
        ShardName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ShardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardName({})", &self.0)
    }
}

impl From<&str> for ShardName {
    fn from(name: &str) -> ShardName {
        ShardName::new(name)
    }
}

impl From<String> for ShardName {
    fn from(name: String) -> ShardName {
        ShardName::new(name)
    }
}

impl AsRef<str> for ShardName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ShardName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Logical key of one index entry: the mapped type's alias plus the entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub alias: String,
    pub id: String,
}

impl EntryKey {
    pub fn new(alias: impl Into<String>, id: impl Into<String>) -> EntryKey {
        EntryKey {
            alias: alias.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.alias, self.id)
    }
}

/// One named, typed field of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
    /// Whether the field value is retrievable from the index, as opposed to
    /// being indexed only.
    pub stored: bool,
}

/// A named, typed bundle of fields produced by the (external) object-to-resource
/// mapping layer. Opaque to the transaction coordinator beyond its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub key: EntryKey,
    pub fields: Vec<Field>,
}

impl Resource {
    pub fn new(alias: impl Into<String>, id: impl Into<String>) -> Resource {
        Resource {
            key: EntryKey::new(alias, id),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Resource {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
            stored: true,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// A term-level delete/search query forwarded to shard writers and readers.
///
/// `expr` is either `field:term` (match `term` within the named field) or a
/// bare `term` (match within any field). An empty alias list places no alias
/// restriction on the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermQuery {
    pub expr: String,
    pub aliases: Vec<String>,
}

impl TermQuery {
    pub fn new(expr: impl Into<String>) -> TermQuery {
        TermQuery {
            expr: expr.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> TermQuery {
        self.aliases.push(alias.into());
        self
    }

    /// Whether the given resource satisfies this query.
    pub fn matches(&self, resource: &Resource) -> bool {
        if !self.aliases.is_empty() && !self.aliases.iter().any(|a| *a == resource.key.alias) {
            return false;
        }
        match self.expr.split_once(':') {
            Some((field, term)) => resource.field(field).is_some_and(|v| v.contains(term)),
            None => resource.fields.iter().any(|f| f.value.contains(&self.expr)),
        }
    }
}

/// Alias/sub-index filter applied to multi-shard operations
/// (`delete_by_query`, `flush_commit`, `search`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShardScope {
    /// No restriction; an empty scope means "everything".
    #[default]
    All,
    /// Restrict to shards serving the given aliases.
    Aliases(Vec<String>),
    /// Restrict to the given shards.
    Shards(Vec<ShardName>),
}

impl ShardScope {
    pub fn all() -> ShardScope {
        ShardScope::All
    }

    pub fn aliases(aliases: impl IntoIterator<Item = impl Into<String>>) -> ShardScope {
        ShardScope::Aliases(aliases.into_iter().map(Into::into).collect())
    }

    pub fn shards(shards: impl IntoIterator<Item = impl Into<ShardName>>) -> ShardScope {
        ShardScope::Shards(shards.into_iter().map(Into::into).collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ShardScope::All)
    }
}
