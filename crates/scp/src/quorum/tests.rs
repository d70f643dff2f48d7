use super::*;

fn n(id: u32) -> NodeId {
    NodeId(id)
}

fn set(ids: &[u32]) -> BTreeSet<NodeId> {
    ids.iter().copied().map(NodeId).collect()
}

fn full(count: u32) -> QuorumSet {
    QuorumSet::simple((0..count).map(NodeId).collect())
}

#[test]
fn test_empty_quorum_set_is_never_satisfied() {
    let qs = QuorumSet::default();
    assert!(!check_quorum_threshold(&qs, &set(&[1, 2, 3]), n(0)));
    assert!(!check_blocking_threshold(&qs, &set(&[1, 2, 3]), n(0)));
}

#[test]
fn test_self_only_quorum_set() {
    let qs = QuorumSet::simple(vec![n(0)]);
    assert!(check_quorum_threshold(&qs, &BTreeSet::new(), n(0)));
    // No peers: nothing can block.
    assert!(!check_blocking_threshold(&qs, &set(&[1]), n(0)));
}

#[test]
fn test_full_topology_requires_strict_majority() {
    // N = 10, self included: 4 peers + self = 5 is not > 5.
    let qs = full(10);
    assert!(!check_quorum_threshold(&qs, &set(&[1, 2, 3, 4]), n(0)));
    assert!(check_quorum_threshold(&qs, &set(&[1, 2, 3, 4, 5]), n(0)));

    // Odd N = 7: 3 peers + self = 4 > 3.5.
    let qs = full(7);
    assert!(!check_quorum_threshold(&qs, &set(&[1, 2]), n(0)));
    assert!(check_quorum_threshold(&qs, &set(&[1, 2, 3]), n(0)));
}

#[test]
fn test_self_is_counted_once() {
    let qs = full(4);
    // Listing self among supporters must not add a second slot.
    assert!(!check_quorum_threshold(&qs, &set(&[0, 1]), n(0)));
    assert!(check_quorum_threshold(&qs, &set(&[0, 1, 2]), n(0)));
}

#[test]
fn test_implicit_self_slot() {
    // Self not listed: slots = 4 peers + implicit self = 5.
    let qs = QuorumSet::simple(vec![n(1), n(2), n(3), n(4)]);
    assert_eq!(qs.slot_count(n(0)), 5);
    assert!(!check_quorum_threshold(&qs, &set(&[1]), n(0)));
    assert!(check_quorum_threshold(&qs, &set(&[1, 2]), n(0)));
}

#[test]
fn test_inner_set_needs_strict_majority() {
    // Slots: self (implicit), node 1, inner {2,3,4}.
    let qs = QuorumSet::new(vec![n(1)], vec![vec![n(2), n(3), n(4)]]);
    assert_eq!(qs.slot_count(n(0)), 3);

    // Self alone: 1 of 3.
    assert!(!check_quorum_threshold(&qs, &BTreeSet::new(), n(0)));
    // Inner set with one of three members is not satisfied.
    assert!(!check_quorum_threshold(&qs, &set(&[2]), n(0)));
    // Two of three satisfies the inner slot.
    assert!(check_quorum_threshold(&qs, &set(&[2, 3]), n(0)));
    assert!(check_quorum_threshold(&qs, &set(&[1]), n(0)));
}

#[test]
fn test_own_membership_counts_inside_inner_set() {
    let qs = QuorumSet::new(vec![n(1), n(2)], vec![vec![n(0), n(3)]]);
    // Inner {0,3}: own plus 3 makes two of two.
    assert!(check_quorum_threshold(&qs, &set(&[3, 1]), n(0)));
    // Inner {0,3} with only own: one of two is not a strict majority.
    assert!(!check_quorum_threshold(&qs, &set(&[1]), n(0)));
}

#[test]
fn test_v_blocking_requires_every_peer() {
    let qs = full(4);
    assert!(!check_blocking_threshold(&qs, &set(&[1, 2]), n(0)));
    assert!(check_blocking_threshold(&qs, &set(&[1, 2, 3]), n(0)));
}

#[test]
fn test_v_blocking_inner_sets() {
    let qs = QuorumSet::new(vec![n(1)], vec![vec![n(2), n(3)], vec![n(0), n(4)]]);
    assert!(!check_blocking_threshold(&qs, &set(&[1, 2]), n(0)));
    assert!(check_blocking_threshold(&qs, &set(&[1, 3, 4]), n(0)));

    // An inner set made only of self cannot be blocked.
    let qs = QuorumSet::new(vec![n(1)], vec![vec![n(0)]]);
    assert!(!check_blocking_threshold(&qs, &set(&[1]), n(0)));
}

#[test]
fn test_peers_excludes_self() {
    let qs = QuorumSet::new(vec![n(0), n(1)], vec![vec![n(2), n(1)]]);
    assert_eq!(qs.peers(n(0)), set(&[1, 2]));
    assert_eq!(qs.members(), set(&[0, 1, 2]));
}

#[test]
fn test_validate() {
    assert!(full(3).validate(n(0)).is_ok());
    assert!(QuorumSet::default().validate(n(0)).is_err());
    assert!(QuorumSet::simple(vec![n(1), n(1)]).validate(n(0)).is_err());
    assert!(QuorumSet::new(vec![n(1)], vec![vec![]]).validate(n(0)).is_err());
    assert!(QuorumSet::new(vec![], vec![vec![n(2), n(2)]])
        .validate(n(0))
        .is_err());
}

#[test]
fn test_quorum_context_delegates() {
    let qs = full(3);
    let ctx = QuorumContext::new(n(0), &qs);
    assert!(ctx.is_quorum(&set(&[1])));
    assert!(!ctx.is_v_blocking(&set(&[1])));
    assert!(ctx.is_v_blocking(&set(&[1, 2])));
}
