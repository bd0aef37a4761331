//! Test infrastructure for the tessera transaction core.
//!
//! [`ScriptedDirectory`](scripted::ScriptedDirectory) is a shard engine whose
//! failures are scripted per shard and per operation, with call counters for
//! every contract method, so coordinator tests can assert exactly-once
//! acquisition, rollback exhaustiveness and lock recovery without a real
//! storage backend.

pub mod policy;
pub mod scripted;

pub use policy::TestPolicy;
pub use scripted::{CallCounts, FailurePlan, ScriptedDirectory};
