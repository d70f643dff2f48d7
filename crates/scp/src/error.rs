//! Error types for SCP node operations.
//!
//! Protocol no-ops (duplicate envelopes, stale slots, values that are
//! already tracked) are not errors and return cleanly. The variants here
//! cover configuration mistakes that are caught when a node is built.

use scpsim_common::NodeId;
use thiserror::Error;

/// Errors that can occur while constructing or wiring SCP nodes.
#[derive(Debug, Error)]
pub enum ScpError {
    /// The quorum set configuration is invalid.
    ///
    /// This can occur when:
    /// - A validator is listed more than once
    /// - An inner set has no members
    /// - The set lists no validators at all
    #[error("invalid quorum set for {node}: {reason}")]
    InvalidQuorumSet { node: NodeId, reason: String },

    /// A quorum set or neighbor list refers to a node that does not exist.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
}
