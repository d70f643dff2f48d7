//! Per-node Stellar Consensus Protocol (SCP) state machine for the network
//! simulator.
//!
//! SCP is a federated Byzantine agreement protocol: every node picks its own
//! quorum slices, and agreement emerges where those slices overlap. This
//! crate models one node's view of the protocol, slot by slot, in a form the
//! discrete-event driver in `scpsim-simulation` can step.
//!
//! ## Key Concepts
//!
//! - **Quorum Slices**: each node lists the validators it trusts
//! - **Quorum**: a set of nodes satisfying strictly more than half of a slice
//! - **V-Blocking**: a set that intersects every slot of a node's slice
//!
//! ## Protocol Phases
//!
//! 1. **Nomination**: nodes propose and vote on candidate values
//! 2. **Prepare**: nodes vote to prepare a ballot over the confirmed values
//! 3. **Commit**: nodes vote to commit the ballot they confirmed as prepared
//! 4. **Externalize**: a confirmed commit is written to the ledger and
//!    everything it finalized is pruned from the node's state
//!
//! ## Message Delivery
//!
//! Nodes never write into each other. Every statement lands in the sender's
//! [`Outbox`], and receivers pull from the highest-priority neighbor through
//! a shared borrow before mutating only themselves:
//!
//! ```ignore
//! use scpsim_scp::{deliver, MessageKind, NodeContext};
//!
//! let ctx = NodeContext::new(now, 1.0);
//! nodes[0].prepare_nomination_msg(&ctx);
//! deliver(&mut nodes, NodeId(1), MessageKind::Nomination, &ctx);
//! ```

mod ballot;
mod commit;
mod error;
mod format;
mod ledger;
mod mempool;
mod node;
mod nomination;
mod outbox;
mod phase;
mod priority;
mod quorum;
mod statement;
mod value;

pub use ballot::BallotProtocol;
pub use commit::CommitProtocol;
pub use error::ScpError;
pub use format::{
    ballot_to_str, commit_to_str, externalize_to_str, nominate_to_str, prepare_to_str,
    transactions_to_str, value_to_str,
};
pub use ledger::{ExternalizedSlots, Ledger, LedgerEntry};
pub use mempool::Mempool;
pub use node::{
    deliver, validate_node_table, MessageKind, Node, Outboxes, PeerOutboxes, ReceivedLogs,
};
pub use nomination::NominationProtocol;
pub use outbox::{Envelope, Outbox, ReceivedLog};
pub use phase::{BallotPhase, NominationPhase, Phase, PhaseTracker, Pledge, StatementCounter};
pub use priority::{neighbor_priority, nomination_round};
pub use quorum::{check_blocking_threshold, check_quorum_threshold, QuorumContext, QuorumSet};
pub use statement::{SCPCommit, SCPExternalize, SCPNominate, SCPPrepare, Statement};
pub use value::{SCPBallot, Tracked, Transaction, Value};

use scpsim_common::{Hash256, NodeId};

/// Result type for SCP operations.
pub type Result<T> = std::result::Result<T, ScpError>;

/// Read-only view of the driver's clock handed to every node operation.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext {
    /// Current simulated time.
    pub now: f64,
    /// Length of a nomination round in simulated time units.
    pub round_duration: f64,
}

impl NodeContext {
    pub fn new(now: f64, round_duration: f64) -> Self {
        Self {
            now,
            round_duration,
        }
    }
}

/// Protocol stage a phase transition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Nomination,
    Prepare,
    Commit,
}

/// Phase a value or ballot moved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Voted,
    Accepted,
    Confirmed,
    Aborted,
}

impl From<NominationPhase> for Step {
    fn from(phase: NominationPhase) -> Self {
        match phase {
            NominationPhase::Voted => Step::Voted,
            NominationPhase::Accepted => Step::Accepted,
            NominationPhase::Confirmed => Step::Confirmed,
        }
    }
}

impl From<BallotPhase> for Step {
    fn from(phase: BallotPhase) -> Self {
        match phase {
            BallotPhase::Voted => Step::Voted,
            BallotPhase::Accepted => Step::Accepted,
            BallotPhase::Confirmed => Step::Confirmed,
            BallotPhase::Aborted => Step::Aborted,
        }
    }
}

/// A state change worth reporting to the driver's event log.
#[derive(Debug, Clone)]
pub enum Transition {
    Phase {
        stage: Stage,
        step: Step,
        value: Hash256,
        transactions: usize,
        counter: u32,
    },
    /// The slot was finalized, either through the node's own commit or by
    /// adopting what its quorum externalized.
    Externalized {
        slot: u64,
        value: Value,
        adopted: bool,
    },
}

impl Transition {
    pub(crate) fn phase(stage: Stage, step: Step, value: &Value, counter: u32) -> Self {
        Transition::Phase {
            stage,
            step,
            value: value.hash(),
            transactions: value.len(),
            counter,
        }
    }
}

/// A [`Transition`] stamped with when and where it happened.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub time: f64,
    pub node: NodeId,
    pub slot: u64,
    pub transition: Transition,
}

/// Output of an engine call: statements to broadcast and transitions to
/// report.
#[derive(Debug)]
pub struct Effects<M> {
    pub statements: Vec<M>,
    pub transitions: Vec<Transition>,
}

impl<M> Default for Effects<M> {
    fn default() -> Self {
        Self {
            statements: Vec::new(),
            transitions: Vec::new(),
        }
    }
}

impl<M> Effects<M> {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.transitions.is_empty()
    }
}
