//! Quorum slice evaluation.
//!
//! A node's [`QuorumSet`] lists direct validators and inner sets. The
//! evaluator answers two questions about a set of supporting peers:
//!
//! - **Quorum**: do the supporters, together with the node itself, satisfy
//!   strictly more than half of the slots of the slice?
//! - **V-blocking**: do the supporters intersect every slot of the slice, so
//!   that no slice can be satisfied without them?
//!
//! # Slots
//!
//! Every direct validator is one slot. Every inner set is one slot, satisfied
//! when strictly more than half of its members support. The node itself
//! always counts as one satisfied slot: it occupies its own entry when it is
//! listed in `nodes`, otherwise it is an extra implicit slot.

use std::collections::BTreeSet;

use scpsim_common::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::ScpError;

/// A node's quorum slice definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumSet {
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub inner_sets: Vec<Vec<NodeId>>,
}

impl QuorumSet {
    pub fn new(nodes: Vec<NodeId>, inner_sets: Vec<Vec<NodeId>>) -> Self {
        Self { nodes, inner_sets }
    }

    /// A flat quorum set over `nodes`.
    pub fn simple(nodes: Vec<NodeId>) -> Self {
        Self::new(nodes, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.inner_sets.is_empty()
    }

    /// Every node named anywhere in the set.
    pub fn members(&self) -> BTreeSet<NodeId> {
        self.nodes
            .iter()
            .chain(self.inner_sets.iter().flatten())
            .copied()
            .collect()
    }

    /// Every node named anywhere in the set except `own`.
    pub fn peers(&self, own: NodeId) -> BTreeSet<NodeId> {
        let mut members = self.members();
        members.remove(&own);
        members
    }

    /// Number of slots as seen by `own`, including its implicit slot.
    pub fn slot_count(&self, own: NodeId) -> usize {
        let implicit = usize::from(!self.nodes.contains(&own));
        self.nodes.len() + self.inner_sets.len() + implicit
    }

    /// Reject sets that list a validator twice or contain an empty inner set.
    pub fn validate(&self, own: NodeId) -> Result<(), ScpError> {
        let invalid = |reason: String| ScpError::InvalidQuorumSet { node: own, reason };

        if self.is_empty() {
            return Err(invalid("no validators".to_string()));
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if !seen.insert(*node) {
                return Err(invalid(format!("{node} listed twice")));
            }
        }
        for (i, inner) in self.inner_sets.iter().enumerate() {
            if inner.is_empty() {
                return Err(invalid(format!("inner set {i} is empty")));
            }
            let mut inner_seen = BTreeSet::new();
            for node in inner {
                if !inner_seen.insert(*node) {
                    return Err(invalid(format!("{node} listed twice in inner set {i}")));
                }
            }
        }
        Ok(())
    }
}

/// Whether `supporters` plus `own` satisfy a quorum of the slice.
pub fn check_quorum_threshold(
    quorum_set: &QuorumSet,
    supporters: &BTreeSet<NodeId>,
    own: NodeId,
) -> bool {
    if quorum_set.is_empty() {
        return false;
    }

    let direct = quorum_set
        .nodes
        .iter()
        .filter(|node| **node != own && supporters.contains(node))
        .count();
    let inner = quorum_set
        .inner_sets
        .iter()
        .filter(|members| inner_set_satisfied(members, supporters, own))
        .count();

    let satisfied = 1 + direct + inner;
    2 * satisfied > quorum_set.slot_count(own)
}

/// Whether `supporters` form a v-blocking set for `own`.
///
/// Every direct peer must support and every inner set must contain a
/// supporter other than `own`. A slice with no peers is never blocked.
pub fn check_blocking_threshold(
    quorum_set: &QuorumSet,
    supporters: &BTreeSet<NodeId>,
    own: NodeId,
) -> bool {
    let mut direct_peers = quorum_set.nodes.iter().filter(|node| **node != own).peekable();
    if direct_peers.peek().is_none() && quorum_set.inner_sets.is_empty() {
        return false;
    }

    direct_peers.all(|node| supporters.contains(node))
        && quorum_set.inner_sets.iter().all(|members| {
            members
                .iter()
                .any(|node| *node != own && supporters.contains(node))
        })
}

fn inner_set_satisfied(members: &[NodeId], supporters: &BTreeSet<NodeId>, own: NodeId) -> bool {
    if members.is_empty() {
        return false;
    }
    let count = members
        .iter()
        .filter(|node| **node == own || supporters.contains(node))
        .count();
    2 * count > members.len()
}

/// Local node identity and slice, threaded through the phase engines.
#[derive(Debug, Clone, Copy)]
pub struct QuorumContext<'a> {
    pub own: NodeId,
    pub quorum_set: &'a QuorumSet,
}

impl<'a> QuorumContext<'a> {
    pub fn new(own: NodeId, quorum_set: &'a QuorumSet) -> Self {
        Self { own, quorum_set }
    }

    pub fn is_quorum(&self, supporters: &BTreeSet<NodeId>) -> bool {
        check_quorum_threshold(self.quorum_set, supporters, self.own)
    }

    pub fn is_v_blocking(&self, supporters: &BTreeSet<NodeId>) -> bool {
        check_blocking_threshold(self.quorum_set, supporters, self.own)
    }
}

#[cfg(test)]
mod tests;
