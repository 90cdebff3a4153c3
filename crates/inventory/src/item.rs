use serde::{Deserialize, Serialize};

use stockledger_core::ItemId;

/// An inventory-tracked product as seen by the ledger.
///
/// Items are owned by the registry; the ledger only reads the identity and the
/// configured minimum-stock floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Floor below which outbound movements must not push the balance.
    pub minimum_stock: u32,
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>, minimum_stock: u32) -> Self {
        Self {
            id,
            name: name.into(),
            minimum_stock,
        }
    }

    pub fn minimum_stock(&self) -> i64 {
        i64::from(self.minimum_stock)
    }
}
