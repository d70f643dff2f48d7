//! Nomination protocol.
//!
//! Nomination is the first phase of a slot: nodes propose candidate values
//! and converge on a set of confirmed ones, whose union becomes the
//! composite value the ballot protocol starts from.
//!
//! # Value Progression
//!
//! ```text
//! [Proposed] --vote--> [Voted] --accept--> [Accepted] --confirm--> [Confirmed]
//! ```
//!
//! - **Vote**: a node votes for the value it proposes, and for any value it
//!   hears about while it has nothing confirmed yet.
//! - **Accept**: a voted value is accepted once a quorum voted for or
//!   accepted it, or once a v-blocking set did.
//! - **Confirm**: an accepted value is confirmed once a quorum accepted it.
//!
//! # Proposal Gating
//!
//! A node proposes its mempool as long as nothing is confirmed yet and the
//! candidate is not already tracked. Echoing a peer's value does not stop
//! it from proposing a different local candidate later.

use std::collections::BTreeSet;

use scpsim_common::{Hash256, NodeId};
use tracing::debug;

use crate::format::value_to_str;
use crate::phase::{NominationPhase, PhaseTracker, Pledge, StatementCounter};
use crate::quorum::QuorumContext;
use crate::statement::SCPNominate;
use crate::value::Value;
use crate::{Effects, Stage, Transition};

/// Nomination state of one node for its current slot.
#[derive(Debug, Clone, Default)]
pub struct NominationProtocol {
    /// Every value the node knows of, in exactly one phase.
    state: PhaseTracker<Value, NominationPhase>,
    /// Support received from peers, per value and pledge.
    statement_counter: StatementCounter,
}

impl NominationProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voted(&self) -> Vec<&Value> {
        self.state.in_phase(NominationPhase::Voted).collect()
    }

    pub fn accepted(&self) -> Vec<&Value> {
        self.state.in_phase(NominationPhase::Accepted).collect()
    }

    pub fn confirmed(&self) -> Vec<&Value> {
        self.state.in_phase(NominationPhase::Confirmed).collect()
    }

    pub fn phase_of(&self, value: &Value) -> Option<NominationPhase> {
        self.state.phase_of(&value.hash())
    }

    pub fn is_tracked(&self, value: &Value) -> bool {
        self.state.contains(&value.hash())
    }

    pub fn has_confirmed(&self) -> bool {
        self.state.in_phase(NominationPhase::Confirmed).next().is_some()
    }

    pub fn statement_counter(&self) -> &StatementCounter {
        &self.statement_counter
    }

    /// Values tracked in any phase.
    pub fn tracked_values(&self) -> impl Iterator<Item = (&Value, NominationPhase)> {
        self.state.iter()
    }

    /// The union of all confirmed values, if any.
    pub fn composite(&self) -> Option<Value> {
        if !self.has_confirmed() {
            return None;
        }
        Some(Value::combine(self.state.in_phase(NominationPhase::Confirmed)))
    }

    /// Propose `candidate` unless it is already tracked or a value is
    /// confirmed.
    pub fn prepare_nomination_msg(
        &mut self,
        candidate: Option<Value>,
        q: &QuorumContext<'_>,
    ) -> Effects<SCPNominate> {
        let mut effects = Effects::default();
        let Some(candidate) = candidate else {
            return effects;
        };
        if candidate.is_empty() || self.is_tracked(&candidate) || self.has_confirmed() {
            return effects;
        }

        debug!(node = %q.own, value = %value_to_str(&candidate), "Nominating own value");
        self.vote(candidate, &mut effects);
        self.update_phases(q, &mut effects);
        effects
    }

    /// Merge a peer's nomination statement.
    ///
    /// Values that contain a finalized transaction are ignored.
    pub fn receive_message(
        &mut self,
        sender: NodeId,
        msg: &SCPNominate,
        finalized: &BTreeSet<Hash256>,
        q: &QuorumContext<'_>,
    ) -> Effects<SCPNominate> {
        let mut effects = Effects::default();
        let (voted, accepted) = msg.parse_message_state();

        for (value, pledge) in [(voted, Pledge::Vote), (accepted, Pledge::Accept)] {
            let Some(value) = value else { continue };
            if value.is_empty() || value.intersects(finalized) {
                continue;
            }
            self.statement_counter.record(&value, pledge, sender);
            if !self.is_tracked(&value) && !self.has_confirmed() {
                self.vote(value, &mut effects);
            }
        }

        self.update_phases(q, &mut effects);
        effects
    }

    fn vote(&mut self, value: Value, effects: &mut Effects<SCPNominate>) {
        effects.transitions.push(Transition::phase(
            Stage::Nomination,
            NominationPhase::Voted.into(),
            &value,
            0,
        ));
        self.state.insert(value.clone(), NominationPhase::Voted);
        effects.statements.push(SCPNominate::vote(value));
    }

    /// Promote voted values to accepted and accepted values to confirmed.
    fn update_phases(&mut self, q: &QuorumContext<'_>, effects: &mut Effects<SCPNominate>) {
        for key in self.state.keys_in_phase(NominationPhase::Voted) {
            let supporters = self
                .statement_counter
                .supporters(&key, &[Pledge::Vote, Pledge::Accept]);
            if q.is_quorum(&supporters) || q.is_v_blocking(&supporters) {
                self.promote(&key, NominationPhase::Accepted, q, effects);
            }
        }

        for key in self.state.keys_in_phase(NominationPhase::Accepted) {
            let accepters = self.statement_counter.supporters(&key, &[Pledge::Accept]);
            if q.is_quorum(&accepters) {
                self.promote(&key, NominationPhase::Confirmed, q, effects);
            }
        }
    }

    fn promote(
        &mut self,
        key: &Hash256,
        next: NominationPhase,
        q: &QuorumContext<'_>,
        effects: &mut Effects<SCPNominate>,
    ) {
        self.state.advance(key, next);
        let Some((value, _)) = self.state.get(key) else {
            return;
        };
        debug!(
            node = %q.own,
            value = %value_to_str(value),
            phase = ?next,
            "Nomination phase change"
        );
        effects
            .transitions
            .push(Transition::phase(Stage::Nomination, next.into(), value, 0));
        if next == NominationPhase::Accepted {
            effects.statements.push(SCPNominate::accept(value.clone()));
        }
    }

    /// Drop every value and support record that shares a transaction with
    /// `finalized`.
    pub fn prune(&mut self, finalized: &BTreeSet<Hash256>) {
        self.state.prune(finalized);
        self.statement_counter.prune(finalized);
    }
}
