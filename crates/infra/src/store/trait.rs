use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use stockledger_core::ItemId;
use stockledger_inventory::{Balance, Item, Movement, NewMovement};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to the business outcomes in
/// `MovementError`. The coordinator translates them at its boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The balance row lock was not granted within the requested bound.
    #[error("balance lock not acquired in time")]
    LockTimeout,

    /// A write referenced an item that no longer exists.
    #[error("referenced item does not exist")]
    MissingItem,

    /// Anything else the backend reported (connection, constraint, decode).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Read-only view of the item master data (external collaborator).
#[async_trait]
pub trait ItemRegistry: Send + Sync {
    /// Look up an item; `Ok(None)` when it does not exist.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Every registered item, in no particular order.
    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;
}

/// Materialized current balance per item.
///
/// Reads here are O(1) per item and never replay the ledger. Writes only happen
/// through a [`StockTransaction`].
#[async_trait]
pub trait BalanceProjector: Send + Sync {
    /// Committed balance row, or `None` if the item never moved.
    async fn balance(&self, item_id: ItemId) -> Result<Option<Balance>, StoreError>;

    /// Every committed balance row.
    async fn balances(&self) -> Result<Vec<Balance>, StoreError>;
}

/// Append-only record of every accepted movement.
///
/// Appends happen through a [`StockTransaction`]; there is no update or delete.
#[async_trait]
pub trait MovementLedger: Send + Sync {
    /// Committed movements for one item, oldest first.
    async fn movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError>;
}

/// Backend holding both logical tables and able to update them atomically.
#[async_trait]
pub trait StockStore: BalanceProjector + MovementLedger {
    /// Start a transaction holding the exclusive lock on `item_id`'s balance row.
    ///
    /// A missing row is created at zero under the same lock. Waiting longer
    /// than `lock_timeout` fails with [`StoreError::LockTimeout`]. Movements on
    /// different items never contend.
    async fn lock_balance(
        &self,
        item_id: ItemId,
        lock_timeout: Duration,
    ) -> Result<Box<dyn StockTransaction>, StoreError>;
}

/// One in-flight unit of work on a single item's balance row.
///
/// Nothing staged here is visible to readers until [`StockTransaction::commit`]
/// succeeds. Dropping the transaction without committing rolls it back.
#[async_trait]
pub trait StockTransaction: Send {
    fn item_id(&self) -> ItemId;

    /// Balance read under the lock (zero for a freshly created row).
    fn current_balance(&self) -> i64;

    /// `true` if the balance row did not exist before this transaction.
    fn row_created(&self) -> bool;

    /// Stage an append to the ledger. The movement must target this item.
    async fn append_movement(&mut self, movement: NewMovement) -> Result<Movement, StoreError>;

    /// Stage the authoritative new balance for this item.
    async fn write_balance(&mut self, quantity: i64) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl<R> ItemRegistry for Arc<R>
where
    R: ItemRegistry + ?Sized,
{
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).get_item(item_id).await
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list_items().await
    }
}

#[async_trait]
impl<S> BalanceProjector for Arc<S>
where
    S: BalanceProjector + ?Sized,
{
    async fn balance(&self, item_id: ItemId) -> Result<Option<Balance>, StoreError> {
        (**self).balance(item_id).await
    }

    async fn balances(&self) -> Result<Vec<Balance>, StoreError> {
        (**self).balances().await
    }
}

#[async_trait]
impl<S> MovementLedger for Arc<S>
where
    S: MovementLedger + ?Sized,
{
    async fn movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
        (**self).movements(item_id).await
    }
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn lock_balance(
        &self,
        item_id: ItemId,
        lock_timeout: Duration,
    ) -> Result<Box<dyn StockTransaction>, StoreError> {
        (**self).lock_balance(item_id, lock_timeout).await
    }
}
