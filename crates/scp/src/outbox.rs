//! Per-node outgoing buffers and per-peer receipt tracking.
//!
//! Delivery is pull based: a node never writes into a peer. Each node keeps
//! one [`Outbox`] per statement kind, and receivers read it through a shared
//! borrow. A [`ReceivedLog`] remembers, per peer, the sequence number of the
//! last envelope pulled and the digests already processed.
//!
//! An owner's slot only grows, so envelopes in an outbox are ordered by slot
//! as well as by sequence number. A receiver can therefore skip everything
//! below its own slot and stop at the first envelope above it.

use std::collections::{BTreeMap, BTreeSet};

use scpsim_common::{Hash256, NodeId};

use crate::statement::Statement;

/// A statement wrapped with its origin.
#[derive(Debug, Clone)]
pub struct Envelope<M> {
    pub sender: NodeId,
    /// The sender's slot when the statement was emitted.
    pub slot: u64,
    /// Position in the sender's outbox.
    pub seq: u64,
    /// Digest over sender, slot and statement content.
    pub hash: Hash256,
    pub statement: M,
}

impl<M: Statement> Envelope<M> {
    pub fn new(sender: NodeId, slot: u64, seq: u64, statement: M) -> Self {
        let hash = Hash256::hash_multi(&[
            &sender.to_bytes(),
            &slot.to_be_bytes(),
            statement.content_hash().as_bytes(),
        ]);
        Self {
            sender,
            slot,
            seq,
            hash,
            statement,
        }
    }
}

/// Outgoing envelopes of one statement kind.
#[derive(Debug, Clone)]
pub struct Outbox<M> {
    next_seq: u64,
    envelopes: BTreeMap<u64, Envelope<M>>,
}

impl<M> Default for Outbox<M> {
    fn default() -> Self {
        Self {
            next_seq: 0,
            envelopes: BTreeMap::new(),
        }
    }
}

impl<M: Statement> Outbox<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement and return its sequence number.
    pub fn push(&mut self, sender: NodeId, slot: u64, statement: M) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.envelopes
            .insert(seq, Envelope::new(sender, slot, seq, statement));
        seq
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope<M>> {
        self.envelopes.values()
    }

    /// The first envelope after `cursor` that is not below `slot`, if it is
    /// for exactly `slot`.
    pub fn next_for_slot(&self, cursor: Option<u64>, slot: u64) -> Option<&Envelope<M>> {
        let start = cursor.map_or(0, |c| c + 1);
        self.envelopes
            .range(start..)
            .map(|(_, env)| env)
            .find(|env| env.slot >= slot)
            .filter(|env| env.slot == slot)
    }

    /// Drop envelopes emitted for slots before `current_slot` and envelopes
    /// referring to a value that shares a transaction with `finalized`.
    pub fn prune(&mut self, current_slot: u64, finalized: &BTreeSet<Hash256>) -> usize {
        let before = self.envelopes.len();
        self.envelopes.retain(|_, env| {
            env.slot >= current_slot
                && !env
                    .statement
                    .values()
                    .iter()
                    .any(|value| value.intersects(finalized))
        });
        before - self.envelopes.len()
    }
}

#[derive(Debug, Clone, Default)]
struct PeerReceipts {
    cursor: Option<u64>,
    /// Envelope digest to the slot it was sent for.
    seen: BTreeMap<Hash256, u64>,
}

/// Receipt tracking for one statement kind.
#[derive(Debug, Clone, Default)]
pub struct ReceivedLog {
    peers: BTreeMap<NodeId, PeerReceipts>,
}

impl ReceivedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the last envelope pulled from `peer`.
    pub fn cursor(&self, peer: NodeId) -> Option<u64> {
        self.peers.get(&peer).and_then(|p| p.cursor)
    }

    /// Mark an envelope as pulled. The cursor always advances; returns
    /// false when the content was already processed.
    pub fn record<M>(&mut self, envelope: &Envelope<M>) -> bool {
        let receipts = self.peers.entry(envelope.sender).or_default();
        receipts.cursor = Some(receipts.cursor.map_or(envelope.seq, |c| c.max(envelope.seq)));
        receipts.seen.insert(envelope.hash, envelope.slot).is_none()
    }

    pub fn seen_count(&self, peer: NodeId) -> usize {
        self.peers.get(&peer).map_or(0, |p| p.seen.len())
    }

    /// Forget digests of envelopes sent for slots before `current_slot`.
    pub fn prune(&mut self, current_slot: u64) {
        for receipts in self.peers.values_mut() {
            receipts.seen.retain(|_, slot| *slot >= current_slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::SCPNominate;
    use crate::value::{Transaction, Value};

    fn value(n: u8) -> Value {
        Value::new(vec![Transaction::new(Hash256::hash(&[n]), 1, 0.0)])
    }

    #[test]
    fn test_next_for_slot_skips_lower_and_waits_on_higher() {
        let mut outbox = Outbox::new();
        outbox.push(NodeId(1), 0, SCPNominate::vote(value(1)));
        outbox.push(NodeId(1), 1, SCPNominate::vote(value(2)));
        outbox.push(NodeId(1), 2, SCPNominate::vote(value(3)));

        assert_eq!(outbox.next_for_slot(None, 0).map(|e| e.seq), Some(0));
        assert_eq!(outbox.next_for_slot(None, 1).map(|e| e.seq), Some(1));
        assert_eq!(outbox.next_for_slot(Some(1), 1).map(|e| e.seq), None);
        assert_eq!(outbox.next_for_slot(Some(0), 0).map(|e| e.seq), None);
        assert!(outbox.next_for_slot(None, 5).is_none());
    }

    #[test]
    fn test_prune_drops_old_slots_and_overlaps() {
        let mut outbox = Outbox::new();
        outbox.push(NodeId(1), 0, SCPNominate::vote(value(1)));
        outbox.push(NodeId(1), 1, SCPNominate::vote(value(2)));
        outbox.push(NodeId(1), 1, SCPNominate::vote(value(3)));

        let finalized: BTreeSet<Hash256> = value(3).transaction_hashes().copied().collect();
        assert_eq!(outbox.prune(1, &finalized), 2);
        assert_eq!(outbox.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1]);
        // Sequence numbers keep growing after pruning.
        assert_eq!(outbox.push(NodeId(1), 1, SCPNominate::vote(value(4))), 3);
    }

    #[test]
    fn test_received_log_is_idempotent() {
        let mut outbox = Outbox::new();
        outbox.push(NodeId(2), 0, SCPNominate::vote(value(1)));
        outbox.push(NodeId(2), 0, SCPNominate::vote(value(1)));
        let envs: Vec<_> = outbox.iter().cloned().collect();

        let mut log = ReceivedLog::new();
        assert!(log.record(&envs[0]));
        assert_eq!(log.cursor(NodeId(2)), Some(0));
        // Same content at a later position: cursor moves, content is known.
        assert!(!log.record(&envs[1]));
        assert_eq!(log.cursor(NodeId(2)), Some(1));
        assert_eq!(log.seen_count(NodeId(2)), 1);

        log.prune(1);
        assert_eq!(log.seen_count(NodeId(2)), 0);
        assert_eq!(log.cursor(NodeId(2)), Some(1));
    }
}
