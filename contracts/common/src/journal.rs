//! Balance Ledger and Mutation Journal
//!
//! The ledger is the asset transfer primitive: one balance per
//! `(asset, account)` pair, native currency and tokens handled alike.
//!
//! The journal records the previous value of everything an operation
//! touches. A checkpoint is a pair of lengths (journal, event log); rolling
//! back to it replays the entries in reverse and drops the events emitted
//! since, leaving state exactly as it was when the checkpoint was taken.

use std::collections::BTreeMap;

use crate::aggregator::Aggregator;
use crate::errors::{FlashError, FlashResult};
use crate::lending_pool::LendingPool;
use crate::reserve_pool::ReservePool;
use crate::types::{Address, Asset};

// ============ Ledger ============

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    balances: BTreeMap<(Asset, Address), u64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, asset: &Asset, account: &Address) -> u64 {
        self.balances.get(&(*asset, *account)).copied().unwrap_or(0)
    }

    /// Overwrite a balance, returning the previous value
    pub fn set(&mut self, asset: Asset, account: Address, amount: u64) -> u64 {
        let previous = if amount == 0 {
            self.balances.remove(&(asset, account))
        } else {
            self.balances.insert((asset, account), amount)
        };
        previous.unwrap_or(0)
    }

    /// Fails with `InsufficientBalance` when `account` holds less than `amount`
    pub fn ensure_balance(&self, asset: &Asset, account: &Address, amount: u64) -> FlashResult<()> {
        let available = self.balance(asset, account);
        if available < amount {
            return Err(FlashError::InsufficientBalance { available, requested: amount });
        }
        Ok(())
    }
}

// ============ Journal ============

/// Previous value of one mutated cell
#[derive(Debug, Clone)]
pub enum JournalEntry {
    Balance {
        asset: Asset,
        account: Address,
        previous: u64,
    },
    ReservePool {
        address: Address,
        previous: Box<ReservePool>,
    },
    LendingPool {
        address: Address,
        previous: Box<LendingPool>,
    },
    Aggregator {
        address: Address,
        previous: Box<Aggregator>,
    },
}

/// Rollback point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub(crate) journal_len: usize,
    pub(crate) events_len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Pop every entry recorded after `len`, newest first
    pub fn unwind(&mut self, len: usize) -> Vec<JournalEntry> {
        let mut undone = self.entries.split_off(len.min(self.entries.len()));
        undone.reverse();
        undone
    }

    /// Forget history once the outermost operation commits
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: Asset = Asset::Token([9u8; 32]);

    #[test]
    fn test_ledger_set_and_balance() {
        let mut ledger = Ledger::new();
        let alice = [1u8; 32];

        assert_eq!(ledger.balance(&TOKEN, &alice), 0);
        assert_eq!(ledger.set(TOKEN, alice, 500), 0);
        assert_eq!(ledger.set(TOKEN, alice, 200), 500);
        assert_eq!(ledger.balance(&TOKEN, &alice), 200);
        assert_eq!(ledger.balance(&Asset::Native, &alice), 0);

        ledger.set(TOKEN, alice, 0);
        assert_eq!(ledger.balance(&TOKEN, &alice), 0);
    }

    #[test]
    fn test_ensure_balance() {
        let mut ledger = Ledger::new();
        let alice = [1u8; 32];
        ledger.set(Asset::Native, alice, 10);

        assert!(ledger.ensure_balance(&Asset::Native, &alice, 10).is_ok());
        assert_eq!(
            ledger.ensure_balance(&Asset::Native, &alice, 11),
            Err(FlashError::InsufficientBalance { available: 10, requested: 11 })
        );
    }

    #[test]
    fn test_unwind_returns_newest_first() {
        let mut journal = Journal::new();
        for previous in 0..4u64 {
            journal.record(JournalEntry::Balance { asset: TOKEN, account: [0u8; 32], previous });
        }

        let undone = journal.unwind(1);
        let previous: Vec<u64> = undone
            .iter()
            .map(|e| match e {
                JournalEntry::Balance { previous, .. } => *previous,
                _ => unreachable!(),
            })
            .collect();

        assert_eq!(previous, vec![3, 2, 1]);
        assert_eq!(journal.len(), 1);
    }
}
