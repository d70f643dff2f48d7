//! Finalized slots.
//!
//! The [`Ledger`] is the node's append-only record of what each slot
//! finalized. [`ExternalizedSlots`] keeps the externalize statements
//! themselves plus the set of every finalized transaction hash, which the
//! pruner and the mempool sync consult.

use std::collections::{BTreeMap, BTreeSet};

use scpsim_common::Hash256;

use crate::statement::SCPExternalize;
use crate::value::Value;

/// One finalized slot.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub value: Value,
    pub timestamp: f64,
}

/// Append-only slot to value record.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: BTreeMap<u64, LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot was already written.
    pub fn record(&mut self, slot: u64, value: Value, timestamp: f64) {
        if let Some(existing) = self.entries.get(&slot) {
            panic!(
                "ledger slot {slot} rewritten: holds {} and got {}",
                existing.value.hash().short(),
                value.hash().short()
            );
        }
        self.entries.insert(slot, LedgerEntry { value, timestamp });
    }

    pub fn get(&self, slot: u64) -> Option<&LedgerEntry> {
        self.entries.get(&slot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &LedgerEntry)> {
        self.entries.iter().map(|(slot, entry)| (*slot, entry))
    }

    pub fn first(&self) -> Option<(u64, &LedgerEntry)> {
        self.entries.iter().next().map(|(slot, entry)| (*slot, entry))
    }
}

/// Externalize statements by slot and the union of finalized transactions.
#[derive(Debug, Clone, Default)]
pub struct ExternalizedSlots {
    by_slot: BTreeMap<u64, SCPExternalize>,
    finalized: BTreeSet<Hash256>,
}

impl ExternalizedSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an externalize statement. Returns false if its slot was
    /// already recorded.
    pub fn insert(&mut self, externalize: SCPExternalize) -> bool {
        if self.by_slot.contains_key(&externalize.slot) {
            return false;
        }
        self.finalized
            .extend(externalize.value().transaction_hashes().copied());
        self.by_slot.insert(externalize.slot, externalize);
        true
    }

    pub fn get(&self, slot: u64) -> Option<&SCPExternalize> {
        self.by_slot.get(&slot)
    }

    pub fn contains_transaction(&self, hash: &Hash256) -> bool {
        self.finalized.contains(hash)
    }

    pub fn finalized_transactions(&self) -> &BTreeSet<Hash256> {
        &self.finalized
    }

    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SCPExternalize> {
        self.by_slot.values()
    }
}
