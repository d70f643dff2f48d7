//! Ballot commit protocol.
//!
//! Mirrors the prepare protocol without aborts: a node votes to commit the
//! ballot it confirmed as prepared, then accepts and confirms the commit as
//! quorum support arrives. A confirmed commit is ready to externalize.

use std::collections::BTreeSet;

use scpsim_common::{Hash256, NodeId};
use tracing::debug;

use crate::format::ballot_to_str;
use crate::phase::{BallotPhase, PhaseTracker, Pledge, StatementCounter};
use crate::quorum::QuorumContext;
use crate::statement::SCPCommit;
use crate::value::{SCPBallot, Value};
use crate::{Effects, Stage, Transition};

/// Commit state of one node for its current slot.
#[derive(Debug, Clone, Default)]
pub struct CommitProtocol {
    state: PhaseTracker<SCPBallot, BallotPhase>,
    commit_statement_counter: StatementCounter,
    /// Counter of the prepared ballot the current commit vote came from.
    prepared_counter: u32,
}

impl CommitProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase_of(&self, value: &Value) -> Option<BallotPhase> {
        self.state.phase_of(&value.hash())
    }

    pub fn ballot_for(&self, value: &Value) -> Option<&SCPBallot> {
        self.state.get(&value.hash()).map(|(ballot, _)| ballot)
    }

    pub fn tracked_ballots(&self) -> impl Iterator<Item = (&SCPBallot, BallotPhase)> {
        self.state.iter()
    }

    pub fn statement_counter(&self) -> &StatementCounter {
        &self.commit_statement_counter
    }

    /// The highest tracked commit ballot and its phase.
    pub fn current(&self) -> Option<(&SCPBallot, BallotPhase)> {
        self.state.iter().max_by(|(a, _), (b, _)| a.cmp(b))
    }

    /// The highest ballot confirmed as committed, if any.
    pub fn confirmed(&self) -> Option<&SCPBallot> {
        self.state.in_phase(BallotPhase::Confirmed).max()
    }

    /// Vote to commit the ballot confirmed as prepared.
    pub fn prepare_commit_msg(
        &mut self,
        confirmed_prepare: Option<&SCPBallot>,
        q: &QuorumContext<'_>,
    ) -> Effects<SCPCommit> {
        let mut effects = Effects::default();
        let Some(prepared) = confirmed_prepare else {
            return effects;
        };
        if self.state.contains(&prepared.value.hash()) {
            return effects;
        }

        debug!(node = %q.own, ballot = %ballot_to_str(prepared), "Voting to commit ballot");
        self.prepared_counter = prepared.counter;
        effects.transitions.push(Transition::phase(
            Stage::Commit,
            BallotPhase::Voted.into(),
            &prepared.value,
            prepared.counter,
        ));
        self.state.insert(prepared.clone(), BallotPhase::Voted);
        self.update_phases(q, &mut effects);
        self.emit(&mut effects);
        effects
    }

    /// Record a peer's commit statement and re-evaluate thresholds.
    ///
    /// Support is recorded for any value; only a value this node already
    /// commits can have its counter raised.
    pub fn simple_process_commit_ballot_message(
        &mut self,
        sender: NodeId,
        msg: &SCPCommit,
        finalized: &BTreeSet<Hash256>,
        q: &QuorumContext<'_>,
    ) -> Effects<SCPCommit> {
        let mut effects = Effects::default();
        let value = &msg.ballot.value;
        if value.is_empty() || value.intersects(finalized) {
            return effects;
        }

        let key = value.hash();
        self.commit_statement_counter
            .record(value, Pledge::Vote, sender);
        self.commit_statement_counter
            .withdraw_except(sender, Pledge::Vote, Some(&key));
        if msg.c_counter > 0 {
            self.commit_statement_counter
                .record(value, Pledge::Accept, sender);
            self.commit_statement_counter
                .withdraw_except(sender, Pledge::Accept, Some(&key));
        } else {
            self.commit_statement_counter
                .withdraw_except(sender, Pledge::Accept, None);
        }

        let mut changed = false;
        if let Some((ballot, _)) = self.state.get(&key) {
            if msg.ballot.counter > ballot.counter {
                self.state.replace(msg.ballot.clone());
                changed = true;
            }
        }

        changed |= self.update_phases(q, &mut effects);
        if changed {
            self.emit(&mut effects);
        }
        effects
    }

    fn update_phases(&mut self, q: &QuorumContext<'_>, effects: &mut Effects<SCPCommit>) -> bool {
        let mut changed = false;
        for key in self.state.keys_in_phase(BallotPhase::Voted) {
            let supporters = self
                .commit_statement_counter
                .supporters(&key, &[Pledge::Vote, Pledge::Accept]);
            if q.is_quorum(&supporters) || q.is_v_blocking(&supporters) {
                self.promote(&key, BallotPhase::Accepted, q, effects);
                changed = true;
            }
        }
        for key in self.state.keys_in_phase(BallotPhase::Accepted) {
            let accepters = self
                .commit_statement_counter
                .supporters(&key, &[Pledge::Accept]);
            if q.is_quorum(&accepters) {
                self.promote(&key, BallotPhase::Confirmed, q, effects);
                changed = true;
            }
        }
        changed
    }

    fn promote(
        &mut self,
        key: &Hash256,
        next: BallotPhase,
        q: &QuorumContext<'_>,
        effects: &mut Effects<SCPCommit>,
    ) {
        self.state.advance(key, next);
        if let Some((ballot, _)) = self.state.get(key) {
            debug!(
                node = %q.own,
                ballot = %ballot_to_str(ballot),
                phase = ?next,
                "Commit phase change"
            );
            effects.transitions.push(Transition::phase(
                Stage::Commit,
                next.into(),
                &ballot.value,
                ballot.counter,
            ));
        }
    }

    /// The statement describing the current commit ballot.
    pub fn statement(&self) -> Option<SCPCommit> {
        let (ballot, phase) = self.current()?;
        let c_counter = if phase >= BallotPhase::Accepted {
            ballot.counter
        } else {
            0
        };
        let h_counter = if phase == BallotPhase::Confirmed {
            ballot.counter
        } else {
            0
        };
        Some(SCPCommit {
            ballot: ballot.clone(),
            prepared_counter: self.prepared_counter,
            h_counter,
            c_counter,
        })
    }

    fn emit(&self, effects: &mut Effects<SCPCommit>) {
        if let Some(statement) = self.statement() {
            effects.statements.push(statement);
        }
    }

    /// Drop every commit ballot and support record whose value shares a
    /// transaction with `finalized`.
    pub fn reset(&mut self, finalized: &BTreeSet<Hash256>) {
        self.state.prune(finalized);
        self.commit_statement_counter.prune(finalized);
        if self.state.is_empty() {
            self.prepared_counter = 0;
        }
    }
}

#[cfg(test)]
mod tests;
