//! SCP statements exchanged between nodes.
//!
//! Each phase has its own statement type. All of them implement
//! [`Statement`], which gives the outbox a content digest for
//! de-duplication and the pruner the values a statement refers to.

use scpsim_common::Hash256;
use serde::{Deserialize, Serialize};

use crate::value::{SCPBallot, Value};

/// Behaviour shared by every statement kind.
pub trait Statement: Clone + std::fmt::Debug {
    /// Short name used in log lines.
    const KIND: &'static str;

    /// Digest of the statement content.
    fn content_hash(&self) -> Hash256;

    /// Values referenced by this statement.
    fn values(&self) -> Vec<&Value>;
}

/// A nomination statement: values voted for and values accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SCPNominate {
    pub voted: Vec<Value>,
    pub accepted: Vec<Value>,
}

impl SCPNominate {
    pub fn vote(value: Value) -> Self {
        Self {
            voted: vec![value],
            accepted: Vec::new(),
        }
    }

    pub fn accept(value: Value) -> Self {
        Self {
            voted: Vec::new(),
            accepted: vec![value],
        }
    }

    /// Collapse the voted and accepted lists into at most one value each.
    pub fn parse_message_state(&self) -> (Option<Value>, Option<Value>) {
        let collapse = |values: &[Value]| {
            if values.is_empty() {
                None
            } else {
                Some(Value::combine(values))
            }
        };
        (collapse(&self.voted), collapse(&self.accepted))
    }
}

impl Statement for SCPNominate {
    const KIND: &'static str = "nominate";

    fn content_hash(&self) -> Hash256 {
        let digest = |values: &[Value]| {
            let hashes: Vec<Hash256> = values.iter().map(Value::hash).collect();
            Hash256::hash_all(&hashes)
        };
        Hash256::hash_multi(&[
            Self::KIND.as_bytes(),
            digest(&self.voted).as_bytes(),
            digest(&self.accepted).as_bytes(),
        ])
    }

    fn values(&self) -> Vec<&Value> {
        self.voted.iter().chain(self.accepted.iter()).collect()
    }
}

/// A prepare statement.
///
/// `ballot` is the sender's live ballot; `prepared` the highest ballot it
/// accepted as prepared. `a_counter` mirrors the prepared counter and
/// `h_counter` the counter of the ballot it confirmed prepared (0 if none).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SCPPrepare {
    pub ballot: SCPBallot,
    pub prepared: Option<SCPBallot>,
    pub a_counter: u32,
    pub h_counter: u32,
    pub c_counter: u32,
}

impl Statement for SCPPrepare {
    const KIND: &'static str = "prepare";

    fn content_hash(&self) -> Hash256 {
        let prepared = self
            .prepared
            .as_ref()
            .map(ballot_digest)
            .unwrap_or(Hash256::ZERO);
        Hash256::hash_multi(&[
            Self::KIND.as_bytes(),
            ballot_digest(&self.ballot).as_bytes(),
            prepared.as_bytes(),
            &self.a_counter.to_be_bytes(),
            &self.h_counter.to_be_bytes(),
            &self.c_counter.to_be_bytes(),
        ])
    }

    fn values(&self) -> Vec<&Value> {
        let mut values = vec![&self.ballot.value];
        if let Some(prepared) = &self.prepared {
            values.push(&prepared.value);
        }
        values
    }
}

/// A commit statement. The value is implicit in `ballot.value`.
///
/// `c_counter` is non-zero once the sender accepted the commit and
/// `h_counter` once it confirmed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SCPCommit {
    pub ballot: SCPBallot,
    pub prepared_counter: u32,
    pub h_counter: u32,
    pub c_counter: u32,
}

impl Statement for SCPCommit {
    const KIND: &'static str = "commit";

    fn content_hash(&self) -> Hash256 {
        Hash256::hash_multi(&[
            Self::KIND.as_bytes(),
            ballot_digest(&self.ballot).as_bytes(),
            &self.prepared_counter.to_be_bytes(),
            &self.h_counter.to_be_bytes(),
            &self.c_counter.to_be_bytes(),
        ])
    }

    fn values(&self) -> Vec<&Value> {
        vec![&self.ballot.value]
    }
}

/// Announcement that the sender finalized `ballot.value` for `slot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SCPExternalize {
    pub slot: u64,
    pub ballot: SCPBallot,
    pub h_counter: u32,
    pub timestamp: f64,
}

impl SCPExternalize {
    pub fn new(slot: u64, ballot: SCPBallot, h_counter: u32, timestamp: f64) -> Self {
        Self {
            slot,
            ballot,
            h_counter,
            timestamp,
        }
    }

    pub fn value(&self) -> &Value {
        &self.ballot.value
    }
}

impl Statement for SCPExternalize {
    const KIND: &'static str = "externalize";

    // The timestamp is local to the sender and does not take part in
    // de-duplication.
    fn content_hash(&self) -> Hash256 {
        Hash256::hash_multi(&[
            Self::KIND.as_bytes(),
            &self.slot.to_be_bytes(),
            ballot_digest(&self.ballot).as_bytes(),
            &self.h_counter.to_be_bytes(),
        ])
    }

    fn values(&self) -> Vec<&Value> {
        vec![&self.ballot.value]
    }
}

fn ballot_digest(ballot: &SCPBallot) -> Hash256 {
    Hash256::hash_multi(&[&ballot.counter.to_be_bytes(), ballot.value.hash().as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Transaction;

    fn value(ids: &[u8]) -> Value {
        Value::new(
            ids.iter()
                .map(|n| Transaction::new(Hash256::hash(&[*n]), 1, 0.0)),
        )
    }

    #[test]
    fn test_parse_message_state() {
        let msg = SCPNominate {
            voted: vec![value(&[1]), value(&[2])],
            accepted: vec![],
        };
        let (voted, accepted) = msg.parse_message_state();
        assert_eq!(voted, Some(value(&[1, 2])));
        assert!(accepted.is_none());

        let (voted, accepted) = SCPNominate::accept(value(&[3])).parse_message_state();
        assert!(voted.is_none());
        assert_eq!(accepted, Some(value(&[3])));
    }

    #[test]
    fn test_content_hash_distinguishes_vote_and_accept() {
        let v = value(&[1]);
        assert_ne!(
            SCPNominate::vote(v.clone()).content_hash(),
            SCPNominate::accept(v.clone()).content_hash()
        );
        assert_eq!(
            SCPNominate::vote(v.clone()).content_hash(),
            SCPNominate::vote(v).content_hash()
        );
    }

    #[test]
    fn test_externalize_hash_ignores_timestamp() {
        let ballot = SCPBallot::new(1, value(&[1]));
        let a = SCPExternalize::new(0, ballot.clone(), 1, 1.0);
        let b = SCPExternalize::new(0, ballot.clone(), 1, 2.0);
        let c = SCPExternalize::new(1, ballot, 1, 1.0);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }
}
