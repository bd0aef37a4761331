//! Task fan-out utilities for the tessera engine.
//!
//! This crate provides the execution plumbing used by transaction finalization:
//! a [`FanOut`](fan_out::FanOut) runner that executes a batch of independent
//! fallible tasks either strictly sequentially or with bounded parallelism and
//! a failure budget, and the [`PermitGate`](permit_gate::PermitGate) blocking
//! permit counter the bounded mode is built on.

pub mod fan_out;
pub mod permit_gate;

pub use fan_out::FanOut;
pub use permit_gate::PermitGate;
