//! Ledger replay: the ground truth the stored balances are checked against.

use serde::Serialize;

use stockledger_core::ItemId;

use crate::movement::Movement;

/// Replay signed movement quantities from zero.
pub fn replay<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> i64 {
    movements.into_iter().map(Movement::signed_quantity).sum()
}

/// Stored balance compared with the replayed ledger for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub item_id: ItemId,
    /// Value held by the balance table (`0` when no row exists).
    pub stored: i64,
    /// Signed sum of the item's ledger.
    pub replayed: i64,
    pub movement_count: usize,
}

impl Reconciliation {
    /// Compare a stored balance against the item's movements.
    ///
    /// Movements belonging to other items are ignored.
    pub fn check(item_id: ItemId, stored: Option<i64>, movements: &[Movement]) -> Self {
        let own: Vec<&Movement> = movements.iter().filter(|m| m.item_id == item_id).collect();
        Self {
            item_id,
            stored: stored.unwrap_or(0),
            replayed: replay(own.iter().copied()),
            movement_count: own.len(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.stored == self.replayed
    }

    pub fn drift(&self) -> i64 {
        self.stored - self.replayed
    }
}
