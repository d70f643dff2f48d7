//! A simulated SCP node.
//!
//! [`Node`] ties the nomination, prepare and commit engines to the node's
//! slot, ledger, mempool, outboxes and receipt logs. Every public operation
//! here is one handler the event scheduler can fire.
//!
//! # Delivery
//!
//! Receiving is split in two steps so that peers are only ever read:
//!
//! 1. `pull_*` scans the neighbors' outboxes through `&[Node]` and clones
//!    the envelope from the highest-priority neighbor that has one for the
//!    node's slot.
//! 2. `process_*` applies it to the node.
//!
//! [`deliver`] runs both steps against a node table.
//!
//! # Externalize
//!
//! Finalizing a slot writes the ledger, advances the slot, and then prunes
//! every value that shares a transaction with the finalized one from all
//! node state. The invariants are re-checked right after; a violation is a
//! bug and panics.

use std::collections::BTreeSet;

use scpsim_common::{Hash256, NodeId};
use tracing::{info, trace, warn};

use crate::ballot::BallotProtocol;
use crate::commit::CommitProtocol;
use crate::format::{
    commit_to_str, externalize_to_str, nominate_to_str, prepare_to_str, transactions_to_str,
    value_to_str,
};
use crate::ledger::{ExternalizedSlots, Ledger};
use crate::mempool::Mempool;
use crate::nomination::NominationProtocol;
use crate::outbox::{Envelope, Outbox, ReceivedLog};
use crate::phase::{Pledge, StatementCounter};
use crate::priority::{neighbor_priority, nomination_round};
use crate::quorum::{QuorumContext, QuorumSet};
use crate::statement::{SCPCommit, SCPExternalize, SCPNominate, SCPPrepare, Statement};
use crate::value::{SCPBallot, Transaction, Value};
use crate::{Effects, NodeContext, Result, ScpError, Transition, TransitionRecord};

/// Statement kinds, each with its own outbox and receipt log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageKind {
    Nomination,
    Prepare,
    Commit,
    Externalize,
}

/// One outbox per statement kind.
#[derive(Debug, Clone, Default)]
pub struct Outboxes {
    pub nominations: Outbox<SCPNominate>,
    pub prepares: Outbox<SCPPrepare>,
    pub commits: Outbox<SCPCommit>,
    pub externalizations: Outbox<SCPExternalize>,
}

impl Outboxes {
    /// Prune the per-slot outboxes. Externalize announcements are kept so
    /// that lagging neighbors can still catch up from them.
    fn prune(&mut self, current_slot: u64, finalized: &BTreeSet<Hash256>) {
        self.nominations.prune(current_slot, finalized);
        self.prepares.prune(current_slot, finalized);
        self.commits.prune(current_slot, finalized);
    }
}

/// One receipt log per statement kind.
#[derive(Debug, Clone, Default)]
pub struct ReceivedLogs {
    pub nominations: ReceivedLog,
    pub prepares: ReceivedLog,
    pub commits: ReceivedLog,
    pub externalizations: ReceivedLog,
}

impl ReceivedLogs {
    pub fn get(&self, kind: MessageKind) -> &ReceivedLog {
        match kind {
            MessageKind::Nomination => &self.nominations,
            MessageKind::Prepare => &self.prepares,
            MessageKind::Commit => &self.commits,
            MessageKind::Externalize => &self.externalizations,
        }
    }

    fn get_mut(&mut self, kind: MessageKind) -> &mut ReceivedLog {
        match kind {
            MessageKind::Nomination => &mut self.nominations,
            MessageKind::Prepare => &mut self.prepares,
            MessageKind::Commit => &mut self.commits,
            MessageKind::Externalize => &mut self.externalizations,
        }
    }

    fn prune(&mut self, current_slot: u64) {
        self.nominations.prune(current_slot);
        self.prepares.prune(current_slot);
        self.commits.prune(current_slot);
        self.externalizations.prune(current_slot);
    }
}

/// Read access to the outboxes of other nodes.
pub trait PeerOutboxes {
    fn outboxes_of(&self, peer: NodeId) -> Option<&Outboxes>;
}

impl PeerOutboxes for [Node] {
    fn outboxes_of(&self, peer: NodeId) -> Option<&Outboxes> {
        self.get(peer.index())
            .filter(|node| node.id == peer)
            .map(|node| &node.outboxes)
    }
}

/// A simulated SCP node.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    quorum_set: QuorumSet,
    neighbors: BTreeSet<NodeId>,
    slot: u64,
    last_externalize_time: f64,
    mempool: Mempool,
    nomination: NominationProtocol,
    prepare: BallotProtocol,
    commit: CommitProtocol,
    externalized: ExternalizedSlots,
    /// Which neighbors announced which value for the current slot.
    externalize_support: StatementCounter,
    ledger: Ledger,
    outboxes: Outboxes,
    received: ReceivedLogs,
    journal: Vec<TransitionRecord>,
}

impl Node {
    /// Build a node at slot 0. Fails if the quorum set is malformed.
    pub fn new(id: NodeId, quorum_set: QuorumSet) -> Result<Self> {
        quorum_set.validate(id)?;
        let neighbors = quorum_set.peers(id);
        Ok(Self {
            id,
            quorum_set,
            neighbors,
            slot: 0,
            last_externalize_time: 0.0,
            mempool: Mempool::new(),
            nomination: NominationProtocol::new(),
            prepare: BallotProtocol::new(),
            commit: CommitProtocol::new(),
            externalized: ExternalizedSlots::new(),
            externalize_support: StatementCounter::new(),
            ledger: Ledger::new(),
            outboxes: Outboxes::default(),
            received: ReceivedLogs::default(),
            journal: Vec::new(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn quorum_set(&self) -> &QuorumSet {
        &self.quorum_set
    }

    pub fn neighbors(&self) -> &BTreeSet<NodeId> {
        &self.neighbors
    }

    /// The slot this node is currently trying to finalize.
    pub fn slot(&self) -> u64 {
        self.slot
    }

    pub fn last_externalize_time(&self) -> f64 {
        self.last_externalize_time
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn nomination(&self) -> &NominationProtocol {
        &self.nomination
    }

    pub fn prepare(&self) -> &BallotProtocol {
        &self.prepare
    }

    pub fn commit(&self) -> &CommitProtocol {
        &self.commit
    }

    pub fn externalized(&self) -> &ExternalizedSlots {
        &self.externalized
    }

    pub fn outboxes(&self) -> &Outboxes {
        &self.outboxes
    }

    pub fn received(&self) -> &ReceivedLogs {
        &self.received
    }

    pub fn is_transaction_in_externalized_slots(&self, hash: &Hash256) -> bool {
        self.externalized.contains_transaction(hash)
    }

    /// Take the transitions recorded since the last call.
    pub fn drain_transitions(&mut self) -> Vec<TransitionRecord> {
        std::mem::take(&mut self.journal)
    }

    /// Add a transaction to the local mempool unless it is already
    /// finalized.
    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        if self.externalized.contains_transaction(&tx.hash) {
            return false;
        }
        self.mempool.add_transaction(tx)
    }

    /// Copy every transaction of `pool` this node neither holds nor
    /// finalized.
    pub fn retrieve_transactions(&mut self, pool: &Mempool) -> usize {
        let copied = self
            .mempool
            .sync_from(pool, self.externalized.finalized_transactions());
        if copied > 0 {
            trace!(node = %self.id, copied, "Retrieved transactions");
        }
        copied
    }

    // --- Nomination ---------------------------------------------------------

    /// Propose the local mempool as a candidate value.
    pub fn prepare_nomination_msg(&mut self, ctx: &NodeContext) -> bool {
        let finalized = self.externalized.finalized_transactions();
        let pending: Vec<Transaction> = self
            .mempool
            .transactions()
            .filter(|tx| !finalized.contains(&tx.hash))
            .cloned()
            .collect();
        let candidate = (!pending.is_empty()).then(|| Value::new(pending));

        let q = QuorumContext::new(self.id, &self.quorum_set);
        let effects = self.nomination.prepare_nomination_msg(candidate, &q);
        self.publish(effects, |o| &mut o.nominations, ctx)
    }

    pub fn pull_nomination(
        &self,
        peers: &(impl PeerOutboxes + ?Sized),
        ctx: &NodeContext,
    ) -> Option<Envelope<SCPNominate>> {
        self.pull(peers, |o| &o.nominations, MessageKind::Nomination, ctx)
    }

    /// Apply a pulled nomination envelope. Returns false if it was not for
    /// this node's slot or was already processed.
    pub fn process_nomination(&mut self, env: Envelope<SCPNominate>, ctx: &NodeContext) -> bool {
        if !self.admit(&env, MessageKind::Nomination) {
            return false;
        }
        trace!(node = %self.id, envelope = %nominate_to_str(&env), "Processing envelope");
        let q = QuorumContext::new(self.id, &self.quorum_set);
        let effects = self.nomination.receive_message(
            env.sender,
            &env.statement,
            self.externalized.finalized_transactions(),
            &q,
        );
        self.publish(effects, |o| &mut o.nominations, ctx);
        true
    }

    // --- Prepare ------------------------------------------------------------

    /// Vote to prepare the composite of the confirmed nomination values.
    pub fn prepare_ballot_msg(&mut self, ctx: &NodeContext) -> bool {
        let q = QuorumContext::new(self.id, &self.quorum_set);
        let composite = self.nomination.composite();
        let effects = self.prepare.prepare_ballot_msg(
            composite,
            self.externalized.finalized_transactions(),
            &q,
        );
        self.publish(effects, |o| &mut o.prepares, ctx)
    }

    pub fn pull_prepare(
        &self,
        peers: &(impl PeerOutboxes + ?Sized),
        ctx: &NodeContext,
    ) -> Option<Envelope<SCPPrepare>> {
        self.pull(peers, |o| &o.prepares, MessageKind::Prepare, ctx)
    }

    pub fn process_prepare(&mut self, env: Envelope<SCPPrepare>, ctx: &NodeContext) -> bool {
        if !self.admit(&env, MessageKind::Prepare) {
            return false;
        }
        trace!(node = %self.id, envelope = %prepare_to_str(&env), "Processing envelope");
        let q = QuorumContext::new(self.id, &self.quorum_set);
        let effects = self.prepare.process_prepare_ballot_message(
            env.sender,
            &env.statement,
            self.externalized.finalized_transactions(),
            &q,
        );
        self.publish(effects, |o| &mut o.prepares, ctx);
        true
    }

    // --- Commit -------------------------------------------------------------

    /// Vote to commit the ballot confirmed as prepared.
    pub fn prepare_commit_msg(&mut self, ctx: &NodeContext) -> bool {
        let q = QuorumContext::new(self.id, &self.quorum_set);
        let effects = self.commit.prepare_commit_msg(self.prepare.confirmed(), &q);
        self.publish(effects, |o| &mut o.commits, ctx)
    }

    pub fn pull_commit(
        &self,
        peers: &(impl PeerOutboxes + ?Sized),
        ctx: &NodeContext,
    ) -> Option<Envelope<SCPCommit>> {
        self.pull(peers, |o| &o.commits, MessageKind::Commit, ctx)
    }

    pub fn process_commit(&mut self, env: Envelope<SCPCommit>, ctx: &NodeContext) -> bool {
        if !self.admit(&env, MessageKind::Commit) {
            return false;
        }
        trace!(node = %self.id, envelope = %commit_to_str(&env), "Processing envelope");
        let q = QuorumContext::new(self.id, &self.quorum_set);
        let effects = self.commit.simple_process_commit_ballot_message(
            env.sender,
            &env.statement,
            self.externalized.finalized_transactions(),
            &q,
        );
        self.publish(effects, |o| &mut o.commits, ctx);
        true
    }

    // --- Externalize --------------------------------------------------------

    /// Finalize the current slot if a commit ballot is confirmed.
    pub fn prepare_externalize_msg(&mut self, ctx: &NodeContext) -> bool {
        let Some(ballot) = self.commit.confirmed().cloned() else {
            return false;
        };
        let h_counter = ballot.counter;
        self.externalize(ballot, h_counter, false, ctx);
        true
    }

    pub fn pull_externalize(
        &self,
        peers: &(impl PeerOutboxes + ?Sized),
        ctx: &NodeContext,
    ) -> Option<Envelope<SCPExternalize>> {
        self.pull(peers, |o| &o.externalizations, MessageKind::Externalize, ctx)
    }

    /// Record a neighbor's externalize announcement and adopt its value once
    /// a quorum or v-blocking set announced the same one for this slot.
    pub fn process_externalize(
        &mut self,
        env: Envelope<SCPExternalize>,
        ctx: &NodeContext,
    ) -> bool {
        if !self.admit(&env, MessageKind::Externalize) {
            return false;
        }
        trace!(node = %self.id, envelope = %externalize_to_str(&env), "Processing envelope");
        let announced = &env.statement;
        if announced.slot != self.slot
            || announced
                .value()
                .intersects(self.externalized.finalized_transactions())
        {
            return true;
        }

        let key = announced.value().hash();
        self.externalize_support
            .record(announced.value(), Pledge::Accept, env.sender);
        self.externalize_support
            .withdraw_except(env.sender, Pledge::Accept, Some(&key));

        let supporters = self.externalize_support.supporters(&key, &[Pledge::Accept]);
        let q = QuorumContext::new(self.id, &self.quorum_set);
        if q.is_quorum(&supporters) || q.is_v_blocking(&supporters) {
            warn!(
                node = %self.id,
                slot = self.slot,
                value = %value_to_str(announced.value()),
                supporters = supporters.len(),
                "Adopting value externalized by quorum"
            );
            self.externalize(announced.ballot.clone(), announced.h_counter, true, ctx);
        }
        true
    }

    fn externalize(&mut self, ballot: SCPBallot, h_counter: u32, adopted: bool, ctx: &NodeContext) {
        let slot = self.slot;
        let value = ballot.value.clone();

        self.ledger.record(slot, value.clone(), ctx.now);
        let announcement = SCPExternalize::new(slot, ballot, h_counter, ctx.now);
        self.externalized.insert(announcement.clone());
        self.outboxes
            .externalizations
            .push(self.id, slot, announcement);

        info!(
            node = %self.id,
            slot,
            value = %value_to_str(&value),
            adopted,
            txs = %transactions_to_str(&value),
            "Externalized slot"
        );
        self.journal.push(TransitionRecord {
            time: ctx.now,
            node: self.id,
            slot,
            transition: Transition::Externalized {
                slot,
                value: value.clone(),
                adopted,
            },
        });

        self.slot += 1;
        self.last_externalize_time = ctx.now;

        let finalized: BTreeSet<Hash256> = value.transaction_hashes().copied().collect();
        self.prune_nomination_phase_data(&finalized);
        self.reset_prepare_ballot_phase(&finalized);
        self.reset_commit_phase_state(&finalized);
        self.mempool.remove_finalized(&finalized);
        self.outboxes.prune(self.slot, &finalized);
        self.received.prune(self.slot);
        self.externalize_support.clear();

        self.check_invariants();
    }

    /// Drop nomination values and support that overlap `finalized`.
    pub fn prune_nomination_phase_data(&mut self, finalized: &BTreeSet<Hash256>) {
        self.nomination.prune(finalized);
    }

    /// Drop prepare ballots and support that overlap `finalized`.
    pub fn reset_prepare_ballot_phase(&mut self, finalized: &BTreeSet<Hash256>) {
        self.prepare.reset(finalized);
    }

    /// Drop commit ballots and support that overlap `finalized`.
    pub fn reset_commit_phase_state(&mut self, finalized: &BTreeSet<Hash256>) {
        self.commit.reset(finalized);
    }

    /// # Panics
    ///
    /// Panics if a finalized transaction is still referenced by the mempool
    /// or by any phase state.
    fn check_invariants(&self) {
        let finalized = self.externalized.finalized_transactions();
        let offending = self
            .mempool
            .transactions()
            .find(|tx| finalized.contains(&tx.hash))
            .map(|tx| ("mempool transaction", tx.hash))
            .or_else(|| {
                self.nomination
                    .tracked_values()
                    .find(|(value, _)| value.intersects(finalized))
                    .map(|(value, _)| ("nomination value", value.hash()))
            })
            .or_else(|| {
                self.prepare
                    .tracked_ballots()
                    .find(|(ballot, _)| ballot.value.intersects(finalized))
                    .map(|(ballot, _)| ("prepare ballot", ballot.value.hash()))
            })
            .or_else(|| {
                self.commit
                    .tracked_ballots()
                    .find(|(ballot, _)| ballot.value.intersects(finalized))
                    .map(|(ballot, _)| ("commit ballot", ballot.value.hash()))
            });

        if let Some((what, hash)) = offending {
            panic!(
                "invariant violated on {} at slot {}: {} {} holds a finalized transaction",
                self.id,
                self.slot,
                what,
                hash.short()
            );
        }
    }

    // --- Plumbing -----------------------------------------------------------

    fn pull<M: Statement>(
        &self,
        peers: &(impl PeerOutboxes + ?Sized),
        select: fn(&Outboxes) -> &Outbox<M>,
        kind: MessageKind,
        ctx: &NodeContext,
    ) -> Option<Envelope<M>> {
        let log = self.received.get(kind);
        let round = nomination_round(ctx.now, self.last_externalize_time, ctx.round_duration);
        let (_, env) = self
            .neighbors
            .iter()
            .filter_map(|peer| {
                let outbox = select(peers.outboxes_of(*peer)?);
                let env = outbox.next_for_slot(log.cursor(*peer), self.slot)?;
                Some((neighbor_priority(self.slot, round, self.id, *peer), env))
            })
            .max_by_key(|(priority, _)| *priority)?;
        trace!(
            node = %self.id,
            from = %env.sender,
            seq = env.seq,
            kind = M::KIND,
            "Pulled envelope"
        );
        Some(env.clone())
    }

    /// Record receipt of an envelope. Returns false when it must not be
    /// processed: wrong slot, not from a neighbor, or content already seen.
    fn admit<M>(&mut self, env: &Envelope<M>, kind: MessageKind) -> bool {
        if env.slot != self.slot || !self.neighbors.contains(&env.sender) {
            return false;
        }
        self.received.get_mut(kind).record(env)
    }

    fn publish<M: Statement>(
        &mut self,
        effects: Effects<M>,
        select: fn(&mut Outboxes) -> &mut Outbox<M>,
        ctx: &NodeContext,
    ) -> bool {
        if effects.is_empty() {
            return false;
        }
        let outbox = select(&mut self.outboxes);
        for statement in effects.statements {
            outbox.push(self.id, self.slot, statement);
        }
        let (node, slot) = (self.id, self.slot);
        self.journal
            .extend(effects.transitions.into_iter().map(|transition| TransitionRecord {
                time: ctx.now,
                node,
                slot,
                transition,
            }));
        true
    }
}

/// Pull one envelope of `kind` for `target` from its neighbors and process
/// it. Returns whether anything was processed.
pub fn deliver(nodes: &mut [Node], target: NodeId, kind: MessageKind, ctx: &NodeContext) -> bool {
    let index = target.index();
    if nodes.get(index).map(|node| node.id) != Some(target) {
        warn!(node = %target, "Delivery to unknown node");
        return false;
    }

    match kind {
        MessageKind::Nomination => match nodes[index].pull_nomination(&*nodes, ctx) {
            Some(env) => nodes[index].process_nomination(env, ctx),
            None => false,
        },
        MessageKind::Prepare => match nodes[index].pull_prepare(&*nodes, ctx) {
            Some(env) => nodes[index].process_prepare(env, ctx),
            None => false,
        },
        MessageKind::Commit => match nodes[index].pull_commit(&*nodes, ctx) {
            Some(env) => nodes[index].process_commit(env, ctx),
            None => false,
        },
        MessageKind::Externalize => match nodes[index].pull_externalize(&*nodes, ctx) {
            Some(env) => nodes[index].process_externalize(env, ctx),
            None => false,
        },
    }
}

/// Check that every node of a table sits at the index matching its id and
/// that every neighbor it lists exists.
pub fn validate_node_table(nodes: &[Node]) -> Result<()> {
    for (index, node) in nodes.iter().enumerate() {
        if node.id.index() != index {
            return Err(ScpError::UnknownNode(node.id));
        }
        if let Some(peer) = node
            .neighbors
            .iter()
            .find(|peer| peer.index() >= nodes.len())
        {
            return Err(ScpError::UnknownNode(*peer));
        }
    }
    Ok(())
}
