//! Interface boundary of the tessera transaction core.
//!
//! This crate defines the capability traits the transaction coordinator
//! consumes from the storage engine ([`ShardDirectory`], [`ShardWriter`],
//! [`ShardResolver`], [`EnginePolicy`]) together with the resource data model
//! that flows through them. Implementations are selected once at engine
//! startup and injected as `Arc<dyn …>` capabilities; the coordinator never
//! depends on a concrete engine.

pub mod config;
pub mod directory;
pub mod model;
pub mod policy;
pub mod resolver;
pub mod writer;

pub use config::ShardSetConfig;
pub use directory::ShardDirectory;
pub use model::{EntryKey, Field, Resource, ShardName, ShardScope, TermQuery};
pub use policy::EnginePolicy;
pub use resolver::ShardResolver;
pub use writer::ShardWriter;
