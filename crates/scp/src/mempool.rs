//! Transaction pools.
//!
//! The same type backs the simulation-wide pool that mining feeds and the
//! per-node pools that nominations are built from.

use std::collections::{BTreeMap, BTreeSet};

use scpsim_common::Hash256;

use crate::value::Transaction;

/// Pending transactions keyed by hash.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: BTreeMap<Hash256, Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction. Returns false if one with the same hash is present.
    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        if self.transactions.contains_key(&tx.hash) {
            return false;
        }
        self.transactions.insert(tx.hash, tx);
        true
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Remove every transaction in `finalized`. Returns how many were removed.
    pub fn remove_finalized(&mut self, finalized: &BTreeSet<Hash256>) -> usize {
        let before = self.transactions.len();
        self.transactions.retain(|hash, _| !finalized.contains(hash));
        before - self.transactions.len()
    }

    /// Copy into `self` every transaction of `source` that is neither held
    /// already nor in `exclude`. Returns the number copied.
    pub fn sync_from(&mut self, source: &Mempool, exclude: &BTreeSet<Hash256>) -> usize {
        let mut copied = 0;
        for (hash, tx) in &source.transactions {
            if exclude.contains(hash) || self.transactions.contains_key(hash) {
                continue;
            }
            self.transactions.insert(*hash, tx.clone());
            copied += 1;
        }
        copied
    }
}
