//! Common types shared by the SCP simulator crates.
//!
//! This crate provides the canonical hash type used to identify
//! transactions, values and envelopes, and the node identifier used by
//! quorum sets and the simulation driver.

pub mod types;

pub use types::{Hash256, NodeId};
