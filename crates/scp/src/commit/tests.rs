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

fn commit(counter: u32, value: &Value, accepted: bool) -> SCPCommit {
    SCPCommit {
        ballot: SCPBallot::new(counter, value.clone()),
        prepared_counter: counter,
        h_counter: 0,
        c_counter: if accepted { counter } else { 0 },
    }
}

fn none() -> BTreeSet<Hash256> {
    BTreeSet::new()
}

#[test]
fn test_commit_vote_mirrors_prepared_ballot() {
    let qs = full(4);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut commit_protocol = CommitProtocol::new();

    assert!(commit_protocol.prepare_commit_msg(None, &q).statements.is_empty());

    let prepared = SCPBallot::new(2, value(&[1]));
    let effects = commit_protocol.prepare_commit_msg(Some(&prepared), &q);
    assert_eq!(effects.statements.len(), 1);
    assert_eq!(effects.statements[0].ballot, prepared);
    assert_eq!(effects.statements[0].prepared_counter, 2);
    assert_eq!(effects.statements[0].c_counter, 0);

    // Voting twice for the same value is a no-op.
    assert!(commit_protocol
        .prepare_commit_msg(Some(&prepared), &q)
        .statements
        .is_empty());
}

#[test]
fn test_commit_accept_then_confirm() {
    let qs = full(4);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut commit_protocol = CommitProtocol::new();
    let v = value(&[1]);

    commit_protocol.prepare_commit_msg(Some(&SCPBallot::new(1, v.clone())), &q);
    commit_protocol.simple_process_commit_ballot_message(
        NodeId(1),
        &commit(1, &v, false),
        &none(),
        &q,
    );
    assert_eq!(commit_protocol.phase_of(&v), Some(BallotPhase::Voted));

    let effects = commit_protocol.simple_process_commit_ballot_message(
        NodeId(2),
        &commit(1, &v, false),
        &none(),
        &q,
    );
    assert_eq!(commit_protocol.phase_of(&v), Some(BallotPhase::Accepted));
    assert_eq!(effects.statements.last().map(|s| s.c_counter), Some(1));

    commit_protocol.simple_process_commit_ballot_message(
        NodeId(1),
        &commit(1, &v, true),
        &none(),
        &q,
    );
    assert!(commit_protocol.confirmed().is_none());
    let effects = commit_protocol.simple_process_commit_ballot_message(
        NodeId(2),
        &commit(1, &v, true),
        &none(),
        &q,
    );
    assert_eq!(commit_protocol.confirmed().map(|b| b.counter), Some(1));
    assert_eq!(effects.statements.last().map(|s| s.h_counter), Some(1));
}

#[test]
fn test_unknown_value_only_records_support() {
    let qs = full(3);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut commit_protocol = CommitProtocol::new();
    let v = value(&[4]);

    let effects = commit_protocol.simple_process_commit_ballot_message(
        NodeId(1),
        &commit(3, &v, true),
        &none(),
        &q,
    );
    assert!(effects.statements.is_empty());
    assert!(commit_protocol.phase_of(&v).is_none());
    assert_eq!(
        commit_protocol
            .statement_counter()
            .supporters(&v.hash(), &[Pledge::Accept])
            .len(),
        1
    );

    // Support recorded before the local vote counts once it arrives.
    let effects = commit_protocol.prepare_commit_msg(Some(&SCPBallot::new(1, v.clone())), &q);
    assert_eq!(commit_protocol.phase_of(&v), Some(BallotPhase::Confirmed));
    assert_eq!(effects.statements.last().map(|s| s.h_counter), Some(1));
}

#[test]
fn test_higher_counter_adopted_for_committed_value() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut commit_protocol = CommitProtocol::new();
    let v = value(&[1]);

    commit_protocol.prepare_commit_msg(Some(&SCPBallot::new(1, v.clone())), &q);
    let effects = commit_protocol.simple_process_commit_ballot_message(
        NodeId(1),
        &commit(4, &v, false),
        &none(),
        &q,
    );
    assert_eq!(commit_protocol.ballot_for(&v).map(|b| b.counter), Some(4));
    assert_eq!(effects.statements.len(), 1);

    let effects = commit_protocol.simple_process_commit_ballot_message(
        NodeId(2),
        &commit(2, &v, false),
        &none(),
        &q,
    );
    assert!(effects.statements.is_empty());
    assert_eq!(commit_protocol.ballot_for(&v).map(|b| b.counter), Some(4));
}

#[test]
fn test_reset_prunes_finalized() {
    let qs = full(10);
    let q = QuorumContext::new(NodeId(0), &qs);
    let mut commit_protocol = CommitProtocol::new();
    let v = value(&[1, 2]);

    commit_protocol.prepare_commit_msg(Some(&SCPBallot::new(1, v.clone())), &q);
    let finalized: BTreeSet<Hash256> = [Hash256::hash(&[1])].into_iter().collect();
    assert!(commit_protocol
        .simple_process_commit_ballot_message(NodeId(1), &commit(1, &v, true), &finalized, &q)
        .statements
        .is_empty());

    commit_protocol.reset(&finalized);
    assert!(commit_protocol.current().is_none());
    assert!(commit_protocol.statement().is_none());
}
