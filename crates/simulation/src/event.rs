//! Event kinds the scheduler can fire.

use std::fmt;
use std::str::FromStr;

use crate::error::SimulationError;

/// A node action the scheduler can fire.
///
/// Declaration order is the scheduler's tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// Mine a fresh transaction into the global mempool.
    Mine,
    /// Copy unseen global-mempool transactions into the node's mempool.
    RetrieveTx,
    Nominate,
    ReceiveNomination,
    PrepareBallot,
    ReceivePrepare,
    PrepareCommit,
    ReceiveCommit,
    Externalize,
    /// Pull a neighbor's externalize announcement for the current slot.
    ReceiveExternalize,
}

impl EventKind {
    /// Every kind, in tie-break order.
    pub const ALL: [EventKind; 10] = [
        EventKind::Mine,
        EventKind::RetrieveTx,
        EventKind::Nominate,
        EventKind::ReceiveNomination,
        EventKind::PrepareBallot,
        EventKind::ReceivePrepare,
        EventKind::PrepareCommit,
        EventKind::ReceiveCommit,
        EventKind::Externalize,
        EventKind::ReceiveExternalize,
    ];

    /// Name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Mine => "mine",
            EventKind::RetrieveTx => "retrieve-tx",
            EventKind::Nominate => "nominate",
            EventKind::ReceiveNomination => "receive-nomination",
            EventKind::PrepareBallot => "prepare-ballot",
            EventKind::ReceivePrepare => "receive-prepare",
            EventKind::PrepareCommit => "prepare-commit",
            EventKind::ReceiveCommit => "receive-commit",
            EventKind::Externalize => "externalize",
            EventKind::ReceiveExternalize => "receive-externalize",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SimulationError::UnknownEvent(s.to_string()))
    }
}
