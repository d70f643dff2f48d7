//! Transactions, values and ballots.
//!
//! A [`Value`] is the unit nodes agree on: a set of transactions unique by
//! hash, identified by the SHA-256 of its sorted transaction hashes. A
//! [`SCPBallot`] pairs a value with a counter and is shared by the prepare
//! and commit phases.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use scpsim_common::Hash256;
use serde::{Deserialize, Serialize};

/// A mined transaction.
///
/// Identity is the `hash` alone; fee and creation time are payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash256,
    pub fee: u64,
    pub creation_time: f64,
}

impl Transaction {
    pub fn new(hash: Hash256, fee: u64, creation_time: f64) -> Self {
        Self {
            hash,
            fee,
            creation_time,
        }
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

/// A batch of transactions proposed for a slot.
///
/// Two values are equal iff they hold the same transaction hashes, which is
/// equivalent to their digests being equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Value {
    transactions: BTreeMap<Hash256, Transaction>,
    hash: Hash256,
}

impl Value {
    /// Build a value from transactions, deduplicating by hash.
    pub fn new<I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = Transaction>,
    {
        let transactions: BTreeMap<Hash256, Transaction> =
            transactions.into_iter().map(|tx| (tx.hash, tx)).collect();
        let hash = Hash256::hash_all(transactions.keys());
        Self { transactions, hash }
    }

    /// The value holding no transactions.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Union the transactions of several values into one canonical value.
    ///
    /// Accepts anything that yields values or references to values, so
    /// loose groups can be chained together by the caller.
    pub fn combine<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Borrow<Value>,
    {
        let mut transactions = BTreeMap::new();
        for value in values {
            for (hash, tx) in &value.borrow().transactions {
                transactions.entry(*hash).or_insert_with(|| tx.clone());
            }
        }
        let hash = Hash256::hash_all(transactions.keys());
        Self { transactions, hash }
    }

    /// Digest over the sorted transaction hashes.
    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Transactions in hash order.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// Transaction hashes in ascending order.
    pub fn transaction_hashes(&self) -> impl Iterator<Item = &Hash256> {
        self.transactions.keys()
    }

    pub fn contains_transaction(&self, hash: &Hash256) -> bool {
        self.transactions.contains_key(hash)
    }

    /// Whether any transaction of this value is in `hashes`.
    pub fn intersects(&self, hashes: &BTreeSet<Hash256>) -> bool {
        if hashes.len() < self.transactions.len() {
            hashes.iter().any(|h| self.transactions.contains_key(h))
        } else {
            self.transactions.keys().any(|h| hashes.contains(h))
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

/// A ballot: a value paired with a counter.
///
/// Ballots are totally ordered by counter, then by the value digest compared
/// bytewise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SCPBallot {
    pub counter: u32,
    pub value: Value,
}

impl SCPBallot {
    pub fn new(counter: u32, value: Value) -> Self {
        Self { counter, value }
    }
}

impl PartialEq for SCPBallot {
    fn eq(&self, other: &Self) -> bool {
        self.counter == other.counter && self.value == other.value
    }
}

impl Eq for SCPBallot {}

impl PartialOrd for SCPBallot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SCPBallot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.value.hash().cmp(&other.value.hash()))
    }
}

/// Anything phase state can be keyed on: the key is always the digest of
/// the underlying value.
pub trait Tracked {
    fn value(&self) -> &Value;

    fn key(&self) -> Hash256 {
        self.value().hash()
    }
}

impl Tracked for Value {
    fn value(&self) -> &Value {
        self
    }
}

impl Tracked for SCPBallot {
    fn value(&self) -> &Value {
        &self.value
    }
}
