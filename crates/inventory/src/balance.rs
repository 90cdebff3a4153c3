use serde::{Deserialize, Serialize};

use stockledger_core::{ItemId, MovementError};

use crate::item::Item;
use crate::movement::{Direction, Quantity};

/// Materialized on-hand quantity for one item.
///
/// A missing balance row means zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub item_id: ItemId,
    pub quantity: i64,
}

impl Balance {
    pub fn zero(item_id: ItemId) -> Self {
        Self {
            item_id,
            quantity: 0,
        }
    }
}

/// Registry item joined with its current balance (zero when none is stored).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub item_id: ItemId,
    pub name: String,
    pub minimum_stock: u32,
    pub quantity: i64,
    pub below_minimum: bool,
}

impl StockLevel {
    pub fn new(item: &Item, quantity: i64) -> Self {
        Self {
            item_id: item.id,
            name: item.name.clone(),
            minimum_stock: item.minimum_stock,
            quantity,
            below_minimum: quantity < item.minimum_stock(),
        }
    }
}

/// Decide the balance that results from moving `quantity` in `direction`.
///
/// Outbound movements may neither exceed the current balance nor leave less
/// than the item's minimum stock. Inbound movements are unrestricted, so a
/// balance may sit below the floor after receiving stock.
pub fn next_balance(
    current: i64,
    item: &Item,
    direction: Direction,
    quantity: Quantity,
) -> Result<i64, MovementError> {
    let requested = quantity.get();
    match direction {
        Direction::Inbound => current.checked_add(requested).ok_or_else(|| {
            MovementError::storage(format!(
                "balance overflow: {current} + {requested} for item {}",
                item.id
            ))
        }),
        Direction::Outbound => {
            if requested > current {
                return Err(MovementError::InsufficientBalance {
                    available: current,
                    requested,
                });
            }
            let remaining = current - requested;
            if remaining < item.minimum_stock() {
                return Err(MovementError::BelowMinimumThreshold {
                    requested,
                    remaining,
                    minimum: item.minimum_stock(),
                });
            }
            Ok(remaining)
        }
    }
}
