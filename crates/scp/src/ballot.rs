//! Ballot prepare protocol.
//!
//! Once nomination confirms at least one value, a node votes to prepare a
//! ballot over the composite of its confirmed values. Ballots race on their
//! counters; a node holds at most one live ballot at a time and aborts the
//! ones it gives up on.
//!
//! # Phases
//!
//! ```text
//! [Voted] --accept--> [Accepted] --confirm--> [Confirmed]
//!    |                    |
//!    +------abort---------+-------> [Aborted]
//! ```
//!
//! A confirmed ballot is locked: it is never aborted, and the commit
//! protocol picks it up from there.
//!
//! # Adoption
//!
//! When a peer's prepare statement arrives, its ballot is compared against
//! the node's live ballot:
//!
//! | incoming vs live               | action                                    |
//! |--------------------------------|-------------------------------------------|
//! | same value, higher counter     | adopt the higher counter                  |
//! | other value, counter not lower | abort the live ballot, adopt the incoming |
//! | same value, lower counter      | ignore                                    |
//! | other value, lower counter     | abort the incoming value                  |
//!
//! With no live ballot the incoming one is adopted, unless its value was
//! already aborted.

use std::collections::BTreeSet;

use scpsim_common::{Hash256, NodeId};
use tracing::{debug, trace};

use crate::format::ballot_to_str;
use crate::phase::{BallotPhase, PhaseTracker, Pledge, StatementCounter};
use crate::quorum::QuorumContext;
use crate::statement::SCPPrepare;
use crate::value::{SCPBallot, Value};
use crate::{Effects, Stage, Transition};

/// Prepare state of one node for its current slot.
#[derive(Debug, Clone, Default)]
pub struct BallotProtocol {
    state: PhaseTracker<SCPBallot, BallotPhase>,
    ballot_statement_counter: StatementCounter,
}

impl BallotProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase_of(&self, value: &Value) -> Option<BallotPhase> {
        self.state.phase_of(&value.hash())
    }

    pub fn ballot_for(&self, value: &Value) -> Option<&SCPBallot> {
        self.state.get(&value.hash()).map(|(ballot, _)| ballot)
    }

    pub fn ballots(&self, phase: BallotPhase) -> Vec<&SCPBallot> {
        self.state.in_phase(phase).collect()
    }

    pub fn tracked_ballots(&self) -> impl Iterator<Item = (&SCPBallot, BallotPhase)> {
        self.state.iter()
    }

    pub fn statement_counter(&self) -> &StatementCounter {
        &self.ballot_statement_counter
    }

    /// The live ballot and its phase, if any.
    pub fn current(&self) -> Option<(&SCPBallot, BallotPhase)> {
        self.state
            .iter()
            .filter(|(_, phase)| phase.is_live())
            .max_by(|(a, _), (b, _)| a.cmp(b))
    }

    /// The ballot this node confirmed as prepared, if any.
    pub fn confirmed(&self) -> Option<&SCPBallot> {
        self.state.in_phase(BallotPhase::Confirmed).max()
    }

    fn highest_aborted_counter(&self) -> Option<u32> {
        self.state
            .in_phase(BallotPhase::Aborted)
            .map(|ballot| ballot.counter)
            .max()
    }

    /// Vote to prepare the composite value when nothing else is in flight.
    pub fn prepare_ballot_msg(
        &mut self,
        composite: Option<Value>,
        finalized: &BTreeSet<Hash256>,
        q: &QuorumContext<'_>,
    ) -> Effects<SCPPrepare> {
        let mut effects = Effects::default();
        let Some(value) = composite else {
            return effects;
        };
        if value.is_empty()
            || value.intersects(finalized)
            || self.state.contains(&value.hash())
            || self.current().is_some()
        {
            return effects;
        }

        let counter = self.highest_aborted_counter().map_or(1, |c| c + 1);
        let ballot = SCPBallot::new(counter, value);
        debug!(node = %q.own, ballot = %ballot_to_str(&ballot), "Voting to prepare ballot");
        self.insert(ballot, BallotPhase::Voted, &mut effects);
        self.update_phases(q, &mut effects);
        self.emit(&mut effects);
        effects
    }

    /// Merge a peer's prepare statement.
    pub fn process_prepare_ballot_message(
        &mut self,
        sender: NodeId,
        msg: &SCPPrepare,
        finalized: &BTreeSet<Hash256>,
        q: &QuorumContext<'_>,
    ) -> Effects<SCPPrepare> {
        let mut effects = Effects::default();
        let incoming = &msg.ballot;
        if incoming.value.is_empty() || incoming.value.intersects(finalized) {
            return effects;
        }

        self.record_support(sender, msg, finalized);

        let before = self.current().map(|(b, p)| (b.clone(), p));
        self.abort_ballots(incoming, &mut effects);
        self.adopt(incoming, q, &mut effects);
        self.update_phases(q, &mut effects);

        let after = self.current().map(|(b, p)| (b.clone(), p));
        if before != after {
            self.emit(&mut effects);
        } else {
            trace!(node = %q.own, from = %sender, "Prepare statement changed nothing");
        }
        effects
    }

    /// Only the sender's latest statement counts as support.
    fn record_support(&mut self, sender: NodeId, msg: &SCPPrepare, finalized: &BTreeSet<Hash256>) {
        let key = msg.ballot.value.hash();
        self.ballot_statement_counter
            .record(&msg.ballot.value, Pledge::Vote, sender);
        self.ballot_statement_counter
            .withdraw_except(sender, Pledge::Vote, Some(&key));

        match &msg.prepared {
            Some(prepared) if !prepared.value.intersects(finalized) => {
                let key = prepared.value.hash();
                self.ballot_statement_counter
                    .record(&prepared.value, Pledge::Accept, sender);
                self.ballot_statement_counter
                    .withdraw_except(sender, Pledge::Accept, Some(&key));
            }
            _ => {
                self.ballot_statement_counter
                    .withdraw_except(sender, Pledge::Accept, None);
            }
        }
    }

    fn adopt(
        &mut self,
        incoming: &SCPBallot,
        q: &QuorumContext<'_>,
        effects: &mut Effects<SCPPrepare>,
    ) {
        let key = incoming.value.hash();
        let Some((current, phase)) = self.current().map(|(b, p)| (b.clone(), p)) else {
            if !self.state.contains(&key) {
                debug!(node = %q.own, ballot = %ballot_to_str(incoming), "Adopting ballot");
                self.insert(incoming.clone(), BallotPhase::Voted, effects);
            }
            return;
        };

        if current.value == incoming.value {
            if incoming.counter > current.counter {
                self.state.replace(incoming.clone());
            }
            return;
        }

        if incoming.counter >= current.counter {
            // A locked ballot stays, and an aborted value cannot come back.
            if phase == BallotPhase::Confirmed || self.state.contains(&key) {
                return;
            }
            self.abort(&current.value.hash(), effects);
            debug!(
                node = %q.own,
                from = %ballot_to_str(&current),
                to = %ballot_to_str(incoming),
                "Switching ballot"
            );
            self.insert(incoming.clone(), BallotPhase::Voted, effects);
        } else if !self.state.contains(&key) {
            self.insert(incoming.clone(), BallotPhase::Aborted, effects);
        }
    }

    /// Abort every voted or accepted ballot for another value whose counter
    /// is below `received.counter`. A ballot for the received value itself
    /// is bumped by adoption instead.
    pub fn abort_ballots(&mut self, received: &SCPBallot, effects: &mut Effects<SCPPrepare>) {
        let stale: Vec<Hash256> = self
            .state
            .iter()
            .filter(|(ballot, phase)| {
                matches!(phase, BallotPhase::Voted | BallotPhase::Accepted)
                    && ballot.counter < received.counter
                    && ballot.value != received.value
            })
            .map(|(ballot, _)| ballot.value.hash())
            .collect();
        for key in stale {
            self.abort(&key, effects);
        }
    }

    fn abort(&mut self, key: &Hash256, effects: &mut Effects<SCPPrepare>) {
        self.state.advance(key, BallotPhase::Aborted);
        if let Some((ballot, _)) = self.state.get(key) {
            effects.transitions.push(Transition::phase(
                Stage::Prepare,
                BallotPhase::Aborted.into(),
                &ballot.value,
                ballot.counter,
            ));
        }
    }

    fn insert(&mut self, ballot: SCPBallot, phase: BallotPhase, effects: &mut Effects<SCPPrepare>) {
        effects.transitions.push(Transition::phase(
            Stage::Prepare,
            phase.into(),
            &ballot.value,
            ballot.counter,
        ));
        self.state.insert(ballot, phase);
    }

    fn update_phases(&mut self, q: &QuorumContext<'_>, effects: &mut Effects<SCPPrepare>) {
        for key in self.state.keys_in_phase(BallotPhase::Voted) {
            let supporters = self
                .ballot_statement_counter
                .supporters(&key, &[Pledge::Vote, Pledge::Accept]);
            if q.is_quorum(&supporters) || q.is_v_blocking(&supporters) {
                self.promote(&key, BallotPhase::Accepted, q, effects);
            }
        }
        for key in self.state.keys_in_phase(BallotPhase::Accepted) {
            let accepters = self
                .ballot_statement_counter
                .supporters(&key, &[Pledge::Accept]);
            if q.is_quorum(&accepters) {
                self.promote(&key, BallotPhase::Confirmed, q, effects);
            }
        }
    }

    fn promote(
        &mut self,
        key: &Hash256,
        next: BallotPhase,
        q: &QuorumContext<'_>,
        effects: &mut Effects<SCPPrepare>,
    ) {
        self.state.advance(key, next);
        if let Some((ballot, _)) = self.state.get(key) {
            debug!(
                node = %q.own,
                ballot = %ballot_to_str(ballot),
                phase = ?next,
                "Prepare phase change"
            );
            effects.transitions.push(Transition::phase(
                Stage::Prepare,
                next.into(),
                &ballot.value,
                ballot.counter,
            ));
        }
    }

    /// The statement describing the current live ballot.
    pub fn statement(&self) -> Option<SCPPrepare> {
        let (ballot, phase) = self.current()?;
        let prepared = (phase >= BallotPhase::Accepted).then(|| ballot.clone());
        let a_counter = prepared.as_ref().map_or(0, |b| b.counter);
        let h_counter = if phase == BallotPhase::Confirmed {
            ballot.counter
        } else {
            0
        };
        Some(SCPPrepare {
            ballot: ballot.clone(),
            prepared,
            a_counter,
            h_counter,
            c_counter: h_counter,
        })
    }

    fn emit(&self, effects: &mut Effects<SCPPrepare>) {
        if let Some(statement) = self.statement() {
            effects.statements.push(statement);
        }
    }

    /// Drop every ballot and support record whose value shares a
    /// transaction with `finalized`.
    pub fn reset(&mut self, finalized: &BTreeSet<Hash256>) {
        self.state.prune(finalized);
        self.ballot_statement_counter.prune(finalized);
    }
}

#[cfg(test)]
mod tests;
