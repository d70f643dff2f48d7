//! Display formatting helpers for values, ballots and envelopes.

use crate::outbox::Envelope;
use crate::statement::{SCPCommit, SCPExternalize, SCPNominate, SCPPrepare};
use crate::value::{SCPBallot, Value};

/// Format a value as its short digest and size.
pub fn value_to_str(value: &Value) -> String {
    format!("{}[{}]", value.hash().short(), value.len())
}

/// Format a ballot as `(counter,digest)`.
pub fn ballot_to_str(ballot: &SCPBallot) -> String {
    format!("({},{})", ballot.counter, ballot.value.hash().short())
}

/// Full transaction hashes of a value, in ascending order, as
/// `[h1,h2,...]`.
pub fn transactions_to_str(value: &Value) -> String {
    let hashes: Vec<String> = value.transaction_hashes().map(|h| h.to_hex()).collect();
    format!("[{}]", hashes.join(","))
}

pub fn nominate_to_str(env: &Envelope<SCPNominate>) -> String {
    let votes: Vec<_> = env.statement.voted.iter().map(value_to_str).collect();
    let accepted: Vec<_> = env.statement.accepted.iter().map(value_to_str).collect();
    format!(
        "NOMINATE<{}, slot={}, votes={:?}, accepted={:?}>",
        env.sender, env.slot, votes, accepted
    )
}

pub fn prepare_to_str(env: &Envelope<SCPPrepare>) -> String {
    let prep = &env.statement;
    format!(
        "PREPARE<{}, slot={}, b={}, p={:?}, a={}, h={}, c={}>",
        env.sender,
        env.slot,
        ballot_to_str(&prep.ballot),
        prep.prepared.as_ref().map(ballot_to_str),
        prep.a_counter,
        prep.h_counter,
        prep.c_counter
    )
}

pub fn commit_to_str(env: &Envelope<SCPCommit>) -> String {
    let commit = &env.statement;
    format!(
        "COMMIT<{}, slot={}, b={}, p_n={}, h={}, c={}>",
        env.sender,
        env.slot,
        ballot_to_str(&commit.ballot),
        commit.prepared_counter,
        commit.h_counter,
        commit.c_counter
    )
}

pub fn externalize_to_str(env: &Envelope<SCPExternalize>) -> String {
    format!(
        "EXTERNALIZE<{}, slot={}, c={}, h={}>",
        env.sender,
        env.statement.slot,
        ballot_to_str(&env.statement.ballot),
        env.statement.h_counter
    )
}
