use super::*;
use crate::quorum::QuorumSet;
use crate::value::Transaction;

fn value(ids: &[u8]) -> Value {
    Value::new(
        ids.iter()
            .map(|n| Transaction::new(Hash256::hash(&[*n]), 1, 0.0)),
    )
}

fn full(count: u32) -> QuorumSet {
    QuorumSet::simple((0..count).map(NodeId).collect())
}

/// Two distinct values ordered by digest.
fn low_high() -> (Value, Value) {
    let (a, b) = (value(&[1]), value(&[2]));
    if a.hash() < b.hash() {
        (a, b)
    } else {
        (b, a)
    }
}

fn prepare(counter: u32, value: &Value) -> SCPPrepare {
    SCPPrepare {
        ballot: SCPBallot::new(counter, value.clone()),
        prepared: None,
        a_counter: 0,
        h_counter: 0,
        c_counter: 0,
    }
}

fn prepared(counter: u32, value: &Value) -> SCPPrepare {
    let ballot = SCPBallot::new(counter, value.clone());
    SCPPrepare {
        ballot: ballot.clone(),
        prepared: Some(ballot),
        a_counter: counter,
        h_counter: 0,
        c_counter: 0,
    }
}

fn none() -> BTreeSet<Hash256> {
    BTreeSet::new()
}

#[test]
fn test_prepare_votes_composite_with_counter_one() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut ballot = BallotProtocol::new();

    assert!(ballot.prepare_ballot_msg(None, &none(), &q).statements.is_empty());

    let v = value(&[1, 2]);
    let effects = ballot.prepare_ballot_msg(Some(v.clone()), &none(), &q);
    assert_eq!(effects.statements.len(), 1);
    let statement = &effects.statements[0];
    assert_eq!(statement.ballot, SCPBallot::new(1, v.clone()));
    assert!(statement.prepared.is_none());
    assert_eq!(statement.h_counter, 0);
    assert_eq!(ballot.phase_of(&v), Some(BallotPhase::Voted));

    // Already holding a live ballot.
    let effects = ballot.prepare_ballot_msg(Some(value(&[3])), &none(), &q);
    assert!(effects.statements.is_empty());
    assert!(ballot.phase_of(&value(&[3])).is_none());
}

#[test]
fn test_higher_counter_aborts_lower_ballot() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut ballot = BallotProtocol::new();
    let a = value(&[1]);
    let b = value(&[2]);

    ballot.prepare_ballot_msg(Some(a.clone()), &none(), &q);
    let effects = ballot.process_prepare_ballot_message(NodeId(1), &prepare(2, &b), &none(), &q);

    assert_eq!(ballot.phase_of(&a), Some(BallotPhase::Aborted));
    assert_eq!(ballot.phase_of(&b), Some(BallotPhase::Voted));
    assert_eq!(ballot.ballot_for(&b).map(|b| b.counter), Some(2));
    assert_eq!(effects.statements.len(), 1);
    assert_eq!(effects.statements[0].ballot, SCPBallot::new(2, b));
}

#[test]
fn test_same_value_higher_counter_is_adopted() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut ballot = BallotProtocol::new();
    let a = value(&[1]);

    ballot.prepare_ballot_msg(Some(a.clone()), &none(), &q);
    ballot.process_prepare_ballot_message(NodeId(1), &prepare(3, &a), &none(), &q);
    assert_eq!(ballot.phase_of(&a), Some(BallotPhase::Voted));
    assert_eq!(ballot.ballot_for(&a).map(|b| b.counter), Some(3));

    // Lower counter for the same value is ignored.
    let effects = ballot.process_prepare_ballot_message(NodeId(2), &prepare(1, &a), &none(), &q);
    assert!(effects.statements.is_empty());
    assert_eq!(ballot.ballot_for(&a).map(|b| b.counter), Some(3));
}

#[test]
fn test_equal_counter_other_value_is_adopted() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let (low, high) = low_high();

    let mut ballot = BallotProtocol::new();
    ballot.prepare_ballot_msg(Some(low.clone()), &none(), &q);
    ballot.process_prepare_ballot_message(NodeId(1), &prepare(1, &high), &none(), &q);
    assert_eq!(ballot.phase_of(&low), Some(BallotPhase::Aborted));
    assert_eq!(ballot.phase_of(&high), Some(BallotPhase::Voted));

    // The value digest plays no part: a lower value at the same counter
    // still replaces the live ballot.
    let mut ballot = BallotProtocol::new();
    ballot.prepare_ballot_msg(Some(high.clone()), &none(), &q);
    let effects =
        ballot.process_prepare_ballot_message(NodeId(1), &prepare(1, &low), &none(), &q);
    assert_eq!(ballot.phase_of(&high), Some(BallotPhase::Aborted));
    assert_eq!(ballot.phase_of(&low), Some(BallotPhase::Voted));
    assert_eq!(effects.statements.len(), 1);
    assert_eq!(effects.statements[0].ballot, SCPBallot::new(1, low));
}

#[test]
fn test_lower_counter_other_value_is_aborted() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let (low, high) = low_high();
    let mut ballot = BallotProtocol::new();

    ballot.process_prepare_ballot_message(NodeId(1), &prepare(2, &low), &none(), &q);
    let effects =
        ballot.process_prepare_ballot_message(NodeId(2), &prepare(1, &high), &none(), &q);
    assert_eq!(ballot.phase_of(&high), Some(BallotPhase::Aborted));
    assert_eq!(ballot.phase_of(&low), Some(BallotPhase::Voted));
    assert!(effects.statements.is_empty());
}

#[test]
fn test_adopts_incoming_without_live_ballot() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut ballot = BallotProtocol::new();
    let v = value(&[5]);

    let effects = ballot.process_prepare_ballot_message(NodeId(3), &prepare(4, &v), &none(), &q);
    assert_eq!(ballot.current().map(|(b, p)| (b.counter, p)), Some((4, BallotPhase::Voted)));
    assert_eq!(effects.statements.len(), 1);
}

#[test]
fn test_new_ballot_counter_follows_aborts() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let (low, high) = low_high();
    let mut ballot = BallotProtocol::new();

    ballot.prepare_ballot_msg(Some(high.clone()), &none(), &q);
    // Higher counter aborts `high` and `low` takes over at counter 2.
    ballot.process_prepare_ballot_message(NodeId(1), &prepare(2, &low), &none(), &q);
    // Counter 3 aborts `low`, but `high` cannot come back.
    ballot.process_prepare_ballot_message(NodeId(1), &prepare(3, &high), &none(), &q);
    assert!(ballot.current().is_none());
    assert_eq!(ballot.ballots(BallotPhase::Aborted).len(), 2);

    let fresh = value(&[9]);
    let effects = ballot.prepare_ballot_msg(Some(fresh.clone()), &none(), &q);
    assert_eq!(effects.statements[0].ballot, SCPBallot::new(3, fresh));

    // An aborted composite is never re-proposed.
    let mut other = BallotProtocol::new();
    other.prepare_ballot_msg(Some(low.clone()), &none(), &q);
    other.process_prepare_ballot_message(NodeId(1), &prepare(1, &high), &none(), &q);
    other.process_prepare_ballot_message(NodeId(1), &prepare(2, &low), &none(), &q);
    assert!(other.current().is_none());
    assert!(other
        .prepare_ballot_msg(Some(low), &none(), &q)
        .statements
        .is_empty());
}

#[test]
fn test_accept_and_confirm_then_lock() {
    let qs = full(3);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut ballot = BallotProtocol::new();
    let a = value(&[1]);

    ballot.prepare_ballot_msg(Some(a.clone()), &none(), &q);
    let effects = ballot.process_prepare_ballot_message(NodeId(1), &prepared(1, &a), &none(), &q);
    assert_eq!(ballot.phase_of(&a), Some(BallotPhase::Confirmed));
    assert_eq!(ballot.confirmed().map(|b| b.counter), Some(1));

    let statement = effects.statements.last().unwrap();
    assert_eq!(statement.prepared, Some(SCPBallot::new(1, a.clone())));
    assert_eq!(statement.h_counter, 1);

    // A confirmed ballot survives a higher incoming one.
    let b = value(&[2]);
    ballot.process_prepare_ballot_message(NodeId(2), &prepare(5, &b), &none(), &q);
    assert_eq!(ballot.phase_of(&a), Some(BallotPhase::Confirmed));
    assert!(ballot.phase_of(&b).is_none());
}

#[test]
fn test_only_latest_statement_counts() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut ballot = BallotProtocol::new();
    let (low, high) = low_high();

    ballot.process_prepare_ballot_message(NodeId(1), &prepared(1, &low), &none(), &q);
    ballot.process_prepare_ballot_message(NodeId(1), &prepare(1, &high), &none(), &q);

    let counter = ballot.statement_counter();
    assert!(counter.supporters(&low.hash(), &[Pledge::Vote]).is_empty());
    assert!(counter.supporters(&low.hash(), &[Pledge::Accept]).is_empty());
    assert_eq!(counter.supporters(&high.hash(), &[Pledge::Vote]).len(), 1);
}

#[test]
fn test_finalized_ballots_are_ignored_and_pruned() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut ballot = BallotProtocol::new();
    let a = value(&[1, 2]);
    let finalized: BTreeSet<Hash256> = [Hash256::hash(&[2])].into_iter().collect();

    let effects = ballot.process_prepare_ballot_message(NodeId(1), &prepare(1, &a), &finalized, &q);
    assert!(effects.statements.is_empty());
    assert!(ballot.current().is_none());
    assert!(ballot
        .prepare_ballot_msg(Some(a.clone()), &finalized, &q)
        .statements
        .is_empty());

    ballot.prepare_ballot_msg(Some(a.clone()), &none(), &q);
    assert!(ballot.current().is_some());
    ballot.reset(&finalized);
    assert!(ballot.current().is_none());
    assert!(ballot.statement_counter().is_empty());
}
