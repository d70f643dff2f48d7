//! Agreement and progress checks over a finished (or running) network.
//!
//! [`check_agreement`] verifies safety: no two nodes finalized different
//! values for the same slot. [`have_all_externalized`] measures progress
//! and flags nodes that fell too far behind the rest.

use std::collections::BTreeMap;
use std::fmt;

use scpsim_common::{Hash256, NodeId};
use scpsim_scp::Node;

// =============================================================================
// Constants
// =============================================================================

/// Default slot spread tolerated between the slowest and fastest node.
pub const DEFAULT_MAX_SPREAD: u64 = 5;

// =============================================================================
// ConsensusCheckResult
// =============================================================================

/// Progress of a network towards a target slot count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusCheckResult {
    /// Every node finalized at least `target` slots.
    AllExternalized,

    /// Some node is still short of the target.
    NotYetExternalized {
        /// Fewest slots finalized by any node.
        min: u64,
        target: u64,
    },

    /// The slowest node trails the fastest by more than allowed.
    SpreadTooWide { min: u64, max: u64, max_spread: u64 },
}

impl ConsensusCheckResult {
    pub fn is_externalized(&self) -> bool {
        matches!(self, ConsensusCheckResult::AllExternalized)
    }

    pub fn is_spread_too_wide(&self) -> bool {
        matches!(self, ConsensusCheckResult::SpreadTooWide { .. })
    }
}

impl fmt::Display for ConsensusCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusCheckResult::AllExternalized => write!(f, "All nodes externalized"),
            ConsensusCheckResult::NotYetExternalized { min, target } => {
                write!(f, "Not yet externalized: min slot count {} < target {}", min, target)
            }
            ConsensusCheckResult::SpreadTooWide {
                min,
                max,
                max_spread,
            } => write!(
                f,
                "Spread too wide: {}-{} = {} > max_spread {}",
                max,
                min,
                max - min,
                max_spread
            ),
        }
    }
}

/// Check that every count in `slot_counts` reached `target` without
/// drifting more than `max_spread` apart.
///
/// ```
/// use scpsim_simulation::consensus::have_all_externalized;
///
/// assert!(have_all_externalized(&[3, 3, 4], 3, 5).is_externalized());
/// assert!(!have_all_externalized(&[2, 3, 4], 3, 5).is_externalized());
/// assert!(have_all_externalized(&[0, 9], 1, 5).is_spread_too_wide());
/// ```
pub fn have_all_externalized(
    slot_counts: &[u64],
    target: u64,
    max_spread: u64,
) -> ConsensusCheckResult {
    let (Some(min), Some(max)) = (slot_counts.iter().min(), slot_counts.iter().max()) else {
        return ConsensusCheckResult::AllExternalized;
    };
    let (min, max) = (*min, *max);

    if max - min > max_spread {
        return ConsensusCheckResult::SpreadTooWide {
            min,
            max,
            max_spread,
        };
    }
    if min >= target {
        ConsensusCheckResult::AllExternalized
    } else {
        ConsensusCheckResult::NotYetExternalized { min, target }
    }
}

/// Number of slots each node finalized, indexed by node id.
pub fn slot_counts(nodes: &[Node]) -> Vec<u64> {
    nodes.iter().map(|node| node.ledger().len() as u64).collect()
}

// =============================================================================
// Agreement
// =============================================================================

/// Two nodes finalized different values for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disagreement {
    pub slot: u64,
    pub first: (NodeId, Hash256),
    pub second: (NodeId, Hash256),
}

impl fmt::Display for Disagreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot {}: {} finalized {} but {} finalized {}",
            self.slot,
            self.first.0,
            self.first.1.short(),
            self.second.0,
            self.second.1.short()
        )
    }
}

/// Verify that all ledgers agree slot by slot. Returns the number of
/// distinct slots finalized by at least one node.
pub fn check_agreement(nodes: &[Node]) -> Result<usize, Disagreement> {
    let mut by_slot: BTreeMap<u64, (NodeId, Hash256)> = BTreeMap::new();
    for node in nodes {
        for (slot, entry) in node.ledger().iter() {
            let hash = entry.value.hash();
            match by_slot.get(&slot) {
                Some(&(other, other_hash)) if other_hash != hash => {
                    return Err(Disagreement {
                        slot,
                        first: (other, other_hash),
                        second: (node.id(), hash),
                    });
                }
                Some(_) => {}
                None => {
                    by_slot.insert(slot, (node.id(), hash));
                }
            }
        }
    }
    Ok(by_slot.len())
}

/// Whether every node finalized slot 0 and all with the same value.
pub fn first_values_agree(nodes: &[Node]) -> bool {
    let mut firsts = nodes.iter().map(|node| node.ledger().get(0).map(|e| e.value.hash()));
    match firsts.next() {
        Some(Some(first)) => firsts.all(|other| other == Some(first)),
        _ => false,
    }
}
