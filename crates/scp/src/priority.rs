//! Neighbor priority for message pulls.
//!
//! When several neighbors have something to deliver, a node pulls from the
//! one ranked highest for the current `(slot, round)`. The ranking is the
//! leading 8 bytes of a SHA-256 digest, so runs replay exactly on every
//! platform and toolchain, and it reshuffles every round.

use scpsim_common::{Hash256, NodeId};

/// Nomination round: 1 during the first `round_duration` after the previous
/// externalize, then one more per elapsed duration.
pub fn nomination_round(now: f64, last_externalize: f64, round_duration: f64) -> u32 {
    if round_duration <= 0.0 || now <= last_externalize {
        return 1;
    }
    let elapsed = ((now - last_externalize) / round_duration).floor();
    1 + elapsed.min(u32::MAX as f64 - 1.0) as u32
}

/// Priority of `neighbor` as seen by `own` in the given slot and round.
pub fn neighbor_priority(slot: u64, round: u32, own: NodeId, neighbor: NodeId) -> u64 {
    let digest = Hash256::hash_multi(&[
        &slot.to_be_bytes(),
        &round.to_be_bytes(),
        &own.to_bytes(),
        &neighbor.to_bytes(),
    ]);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(prefix)
}
