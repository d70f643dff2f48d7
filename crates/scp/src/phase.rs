//! Phase bookkeeping shared by the nomination, prepare and commit engines.
//!
//! [`PhaseTracker`] maps a value digest to the tracked item and the phase it
//! is in, so a value can only ever occupy one phase. [`StatementCounter`]
//! records which peers vouched for a value, and how.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use scpsim_common::{Hash256, NodeId};

use crate::value::{Tracked, Value};

/// A phase enum with a transition rule.
pub trait Phase: Copy + Eq + fmt::Debug {
    fn can_advance_to(self, next: Self) -> bool;
}

/// Nomination phases of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NominationPhase {
    Voted,
    Accepted,
    Confirmed,
}

impl Phase for NominationPhase {
    fn can_advance_to(self, next: Self) -> bool {
        next > self
    }
}

/// Prepare and commit phases of a ballot.
///
/// `Aborted` is terminal and only reachable from `Voted` or `Accepted`; a
/// confirmed ballot is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BallotPhase {
    Voted,
    Accepted,
    Confirmed,
    Aborted,
}

impl BallotPhase {
    /// Voted, accepted and confirmed ballots are live.
    pub fn is_live(self) -> bool {
        self != BallotPhase::Aborted
    }
}

impl Phase for BallotPhase {
    fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (BallotPhase::Confirmed, BallotPhase::Aborted) => false,
            (BallotPhase::Aborted, _) => false,
            _ => next > self,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<T, P> {
    item: T,
    phase: P,
}

/// Tracked items keyed by value digest, each in exactly one phase.
#[derive(Debug, Clone)]
pub struct PhaseTracker<T, P> {
    entries: BTreeMap<Hash256, Entry<T, P>>,
}

impl<T, P> Default for PhaseTracker<T, P> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Tracked, P: Phase> PhaseTracker<T, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &Hash256) -> bool {
        self.entries.contains_key(key)
    }

    pub fn phase_of(&self, key: &Hash256) -> Option<P> {
        self.entries.get(key).map(|e| e.phase)
    }

    pub fn get(&self, key: &Hash256) -> Option<(&T, P)> {
        self.entries.get(key).map(|e| (&e.item, e.phase))
    }

    /// Start tracking `item` in `phase`. Returns false if its value is
    /// already tracked, in any phase.
    pub fn insert(&mut self, item: T, phase: P) -> bool {
        let key = item.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, Entry { item, phase });
        true
    }

    /// Move a tracked value to `next`.
    ///
    /// # Panics
    ///
    /// Panics on a transition the phase does not allow, such as a
    /// regression or aborting a confirmed ballot.
    pub fn advance(&mut self, key: &Hash256, next: P) {
        if let Some(entry) = self.entries.get_mut(key) {
            assert!(
                entry.phase.can_advance_to(next),
                "illegal phase transition {:?} -> {:?} for value {}",
                entry.phase,
                next,
                key.short()
            );
            entry.phase = next;
        }
    }

    /// Replace the tracked item, keeping its phase. The new item must refer
    /// to the same value.
    pub fn replace(&mut self, item: T) {
        if let Some(entry) = self.entries.get_mut(&item.key()) {
            entry.item = item;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, P)> {
        self.entries.values().map(|e| (&e.item, e.phase))
    }

    /// Items currently in `phase`, in key order.
    pub fn in_phase(&self, phase: P) -> impl Iterator<Item = &T> {
        self.entries
            .values()
            .filter(move |e| e.phase == phase)
            .map(|e| &e.item)
    }

    pub fn keys_in_phase(&self, phase: P) -> Vec<Hash256> {
        self.entries
            .iter()
            .filter(|(_, e)| e.phase == phase)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Drop every item whose value shares a transaction with `finalized`.
    /// Returns the number of items removed.
    pub fn prune(&mut self, finalized: &BTreeSet<Hash256>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| !e.item.value().intersects(finalized));
        before - self.entries.len()
    }
}

/// The kind of support a peer expressed for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pledge {
    Vote,
    Accept,
}

#[derive(Debug, Clone)]
struct Support {
    value: Value,
    pledges: BTreeMap<Pledge, BTreeMap<NodeId, u32>>,
}

/// Per-value record of which peers voted for or accepted it, with the
/// number of statements received from each.
#[derive(Debug, Clone, Default)]
pub struct StatementCounter {
    entries: BTreeMap<Hash256, Support>,
}

impl StatementCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record one statement of `peer` for `value`. Returns the new count.
    pub fn record(&mut self, value: &Value, pledge: Pledge, peer: NodeId) -> u32 {
        let support = self
            .entries
            .entry(value.hash())
            .or_insert_with(|| Support {
                value: value.clone(),
                pledges: BTreeMap::new(),
            });
        let count = support
            .pledges
            .entry(pledge)
            .or_default()
            .entry(peer)
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Remove `peer` from the `pledge` supporters of every value except
    /// `keep`, so that only its latest statement counts.
    pub fn withdraw_except(&mut self, peer: NodeId, pledge: Pledge, keep: Option<&Hash256>) {
        for (key, support) in self.entries.iter_mut() {
            if Some(key) == keep {
                continue;
            }
            if let Some(peers) = support.pledges.get_mut(&pledge) {
                peers.remove(&peer);
            }
        }
    }

    /// Peers that made any of `pledges` for the value.
    pub fn supporters(&self, key: &Hash256, pledges: &[Pledge]) -> BTreeSet<NodeId> {
        let Some(support) = self.entries.get(key) else {
            return BTreeSet::new();
        };
        pledges
            .iter()
            .filter_map(|p| support.pledges.get(p))
            .flat_map(|peers| peers.keys().copied())
            .collect()
    }

    pub fn count(&self, key: &Hash256, pledge: Pledge, peer: NodeId) -> u32 {
        self.entries
            .get(key)
            .and_then(|s| s.pledges.get(&pledge))
            .and_then(|peers| peers.get(&peer))
            .copied()
            .unwrap_or(0)
    }

    /// Values with at least one recorded supporter.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|s| &s.value)
    }

    /// Drop every value that shares a transaction with `finalized`.
    pub fn prune(&mut self, finalized: &BTreeSet<Hash256>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, s| !s.value.intersects(finalized));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{SCPBallot, Transaction};

    fn value(n: u8) -> Value {
        Value::new(vec![Transaction::new(Hash256::hash(&[n]), 1, 0.0)])
    }

    #[test]
    fn test_nomination_phase_is_monotonic() {
        assert!(NominationPhase::Voted.can_advance_to(NominationPhase::Accepted));
        assert!(NominationPhase::Voted.can_advance_to(NominationPhase::Confirmed));
        assert!(!NominationPhase::Confirmed.can_advance_to(NominationPhase::Voted));
        assert!(!NominationPhase::Accepted.can_advance_to(NominationPhase::Accepted));
    }

    #[test]
    fn test_confirmed_ballot_is_locked() {
        assert!(BallotPhase::Voted.can_advance_to(BallotPhase::Aborted));
        assert!(BallotPhase::Accepted.can_advance_to(BallotPhase::Aborted));
        assert!(!BallotPhase::Confirmed.can_advance_to(BallotPhase::Aborted));
        assert!(!BallotPhase::Aborted.can_advance_to(BallotPhase::Voted));
    }

    #[test]
    fn test_tracker_rejects_duplicate_values() {
        let mut tracker: PhaseTracker<SCPBallot, BallotPhase> = PhaseTracker::new();
        assert!(tracker.insert(SCPBallot::new(1, value(1)), BallotPhase::Voted));
        // Same value under a different counter is still the same key.
        assert!(!tracker.insert(SCPBallot::new(2, value(1)), BallotPhase::Aborted));
        assert_eq!(tracker.len(), 1);

        tracker.replace(SCPBallot::new(5, value(1)));
        let (ballot, phase) = tracker.get(&value(1).hash()).unwrap();
        assert_eq!(ballot.counter, 5);
        assert_eq!(phase, BallotPhase::Voted);
    }

    #[test]
    #[should_panic(expected = "illegal phase transition")]
    fn test_tracker_panics_on_regression() {
        let mut tracker: PhaseTracker<Value, NominationPhase> = PhaseTracker::new();
        tracker.insert(value(1), NominationPhase::Accepted);
        tracker.advance(&value(1).hash(), NominationPhase::Voted);
    }

    #[test]
    fn test_tracker_prune() {
        let mut tracker: PhaseTracker<Value, NominationPhase> = PhaseTracker::new();
        tracker.insert(value(1), NominationPhase::Voted);
        tracker.insert(value(2), NominationPhase::Confirmed);
        let finalized: BTreeSet<Hash256> = value(2).transaction_hashes().copied().collect();
        assert_eq!(tracker.prune(&finalized), 1);
        assert!(tracker.contains(&value(1).hash()));
        assert_eq!(tracker.keys_in_phase(NominationPhase::Confirmed), vec![]);
    }

    #[test]
    fn test_statement_counter_latest_statement_only() {
        let mut counter = StatementCounter::new();
        let (a, b) = (value(1), value(2));
        assert_eq!(counter.record(&a, Pledge::Vote, NodeId(1)), 1);
        assert_eq!(counter.record(&a, Pledge::Vote, NodeId(1)), 2);
        counter.record(&a, Pledge::Vote, NodeId(2));

        counter.record(&b, Pledge::Vote, NodeId(1));
        counter.withdraw_except(NodeId(1), Pledge::Vote, Some(&b.hash()));

        let a_votes = counter.supporters(&a.hash(), &[Pledge::Vote]);
        assert_eq!(a_votes.into_iter().collect::<Vec<_>>(), vec![NodeId(2)]);
        assert_eq!(counter.count(&b.hash(), Pledge::Vote, NodeId(1)), 1);
        assert_eq!(counter.count(&a.hash(), Pledge::Vote, NodeId(1)), 0);
    }

    #[test]
    fn test_statement_counter_supporters_union() {
        let mut counter = StatementCounter::new();
        let a = value(1);
        counter.record(&a, Pledge::Vote, NodeId(1));
        counter.record(&a, Pledge::Accept, NodeId(2));
        assert_eq!(
            counter.supporters(&a.hash(), &[Pledge::Vote, Pledge::Accept]).len(),
            2
        );
        assert_eq!(counter.supporters(&a.hash(), &[Pledge::Accept]).len(), 1);
        assert!(counter
            .supporters(&value(9).hash(), &[Pledge::Vote])
            .is_empty());
    }
}
