//! Quorum-set builders run once before the scheduler starts.

use std::collections::BTreeSet;

use rand::Rng;
use scpsim_common::NodeId;
use scpsim_scp::QuorumSet;
use tracing::warn;

use crate::config::TopologyKind;
use crate::error::{Result, SimulationError};

/// Quorum sets for `node_count` nodes, indexed by node id.
pub fn build_quorum_sets<R: Rng>(
    topology: &TopologyKind,
    node_count: usize,
    rng: &mut R,
) -> Result<Vec<QuorumSet>> {
    match topology {
        TopologyKind::Full => Ok(full(node_count)),
        TopologyKind::Er { p } => Ok(erdos_renyi(node_count, *p, rng)),
        TopologyKind::Hardcoded { quorum_sets } => {
            if quorum_sets.len() != node_count {
                return Err(SimulationError::InvalidConfig(format!(
                    "{} hard-coded quorum sets for {} nodes",
                    quorum_sets.len(),
                    node_count
                )));
            }
            Ok(quorum_sets.clone())
        }
    }
}

/// Everyone trusts everyone, so a quorum is any strict majority.
pub fn full(node_count: usize) -> Vec<QuorumSet> {
    let members: Vec<NodeId> = (0..node_count as u32).map(NodeId).collect();
    vec![QuorumSet::simple(members); node_count]
}

/// Symmetric random graph; each node's slice is itself plus its neighbors.
pub fn erdos_renyi<R: Rng>(node_count: usize, p: f64, rng: &mut R) -> Vec<QuorumSet> {
    let mut adjacency = vec![BTreeSet::new(); node_count];
    for i in 0..node_count {
        for j in (i + 1)..node_count {
            if rng.gen::<f64>() < p {
                adjacency[i].insert(NodeId(j as u32));
                adjacency[j].insert(NodeId(i as u32));
            }
        }
    }

    adjacency
        .into_iter()
        .enumerate()
        .map(|(i, links)| {
            let own = NodeId(i as u32);
            if links.is_empty() {
                warn!(node = %own, "isolated node only trusts itself");
            }
            let mut nodes = vec![own];
            nodes.extend(links);
            nodes.sort();
            QuorumSet::simple(nodes)
        })
        .collect()
}
