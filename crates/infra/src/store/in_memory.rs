use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use stockledger_core::{ItemId, MovementId};
use stockledger_inventory::{Balance, Item, Movement, NewMovement};

use super::r#trait::{
    BalanceProjector, ItemRegistry, MovementLedger, StockStore, StockTransaction, StoreError,
};

fn poisoned() -> StoreError {
    StoreError::backend("lock poisoned")
}

/// In-memory item registry.
///
/// Intended for tests/dev. The registry is owned by master-data management, so
/// mutation here only stands in for that external system.
#[derive(Debug, Default)]
pub struct InMemoryItemRegistry {
    items: RwLock<HashMap<ItemId, Item>>,
}

impl InMemoryItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let registry = Self::new();
        for item in items {
            registry.upsert(item);
        }
        registry
    }

    pub fn upsert(&self, item: Item) {
        if let Ok(mut items) = self.items.write() {
            items.insert(item.id, item);
        }
    }

    pub fn remove(&self, item_id: ItemId) -> Option<Item> {
        self.items.write().ok()?.remove(&item_id)
    }

    pub fn contains(&self, item_id: ItemId) -> Result<bool, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.contains_key(&item_id))
    }
}

#[async_trait]
impl ItemRegistry for InMemoryItemRegistry {
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(&item_id).cloned())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.values().cloned().collect())
    }
}

/// Committed state: the two logical tables.
#[derive(Debug, Default)]
struct Tables {
    balances: HashMap<ItemId, i64>,
    movements: HashMap<ItemId, Vec<Movement>>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    /// One async mutex per balance row; held for the whole transaction.
    ///
    /// Entries exist only while a transaction holds or waits for the row and
    /// are removed by the last [`RowGuard`] to let go.
    row_locks: Mutex<HashMap<ItemId, Arc<RowLock<()>>>>,
    last_sequence: AtomicU64,
    /// Items referenced by rows must exist here at commit time.
    registry: Option<Arc<InMemoryItemRegistry>>,
}

impl Shared {
    fn row_lock(&self, item_id: ItemId) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(item_id).or_default().clone())
    }
}

/// In-memory balance table + ledger with per-item row locks.
///
/// Intended for tests/dev. Transactions stage their writes and apply them in
/// one step on commit, so readers never observe a ledger append without the
/// matching balance update. When linked to a registry with
/// [`InMemoryStockStore::with_registry`], commits for items missing from it
/// fail with [`StoreError::MissingItem`], like a foreign key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    shared: Arc<Shared>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Arc<InMemoryItemRegistry>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Some(registry),
                ..Shared::default()
            }),
        }
    }

    /// Total number of committed movements across all items.
    pub fn movement_count(&self) -> usize {
        self.shared
            .tables
            .read()
            .map(|t| t.movements.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn row_lock_count(&self) -> usize {
        self.shared.row_locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BalanceProjector for InMemoryStockStore {
    async fn balance(&self, item_id: ItemId) -> Result<Option<Balance>, StoreError> {
        let tables = self.shared.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .balances
            .get(&item_id)
            .map(|quantity| Balance {
                item_id,
                quantity: *quantity,
            }))
    }

    async fn balances(&self) -> Result<Vec<Balance>, StoreError> {
        let tables = self.shared.tables.read().map_err(|_| poisoned())?;
        let mut all: Vec<Balance> = tables
            .balances
            .iter()
            .map(|(item_id, quantity)| Balance {
                item_id: *item_id,
                quantity: *quantity,
            })
            .collect();
        all.sort_by_key(|b| b.item_id);
        Ok(all)
    }
}

#[async_trait]
impl MovementLedger for InMemoryStockStore {
    async fn movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
        let tables = self.shared.tables.read().map_err(|_| poisoned())?;
        Ok(tables.movements.get(&item_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn lock_balance(
        &self,
        item_id: ItemId,
        lock_timeout: Duration,
    ) -> Result<Box<dyn StockTransaction>, StoreError> {
        let row_lock = self.shared.row_lock(item_id)?;
        let guard = tokio::time::timeout(lock_timeout, row_lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        let guard = RowGuard {
            shared: self.shared.clone(),
            item_id,
            guard: Some(guard),
        };

        let existing = {
            let tables = self.shared.tables.read().map_err(|_| poisoned())?;
            tables.balances.get(&item_id).copied()
        };

        Ok(Box::new(InMemoryTransaction {
            shared: self.shared.clone(),
            item_id,
            _guard: guard,
            current: existing.unwrap_or(0),
            created: existing.is_none(),
            staged_movements: Vec::new(),
            staged_balance: None,
        }))
    }
}

/// Holds a row lock; releases it and prunes the unused entry on drop.
struct RowGuard {
    shared: Arc<Shared>,
    item_id: ItemId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters clone the Arc under this mutex, so a count of 1 means nobody
        // else holds or waits for the row.
        if let Ok(mut locks) = self.shared.row_locks.lock() {
            if locks
                .get(&self.item_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&self.item_id);
            }
        }
    }
}

struct InMemoryTransaction {
    shared: Arc<Shared>,
    item_id: ItemId,
    _guard: RowGuard,
    current: i64,
    created: bool,
    staged_movements: Vec<Movement>,
    staged_balance: Option<i64>,
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    fn item_id(&self) -> ItemId {
        self.item_id
    }

    fn current_balance(&self) -> i64 {
        self.current
    }

    fn row_created(&self) -> bool {
        self.created
    }

    async fn append_movement(&mut self, movement: NewMovement) -> Result<Movement, StoreError> {
        if movement.item_id != self.item_id {
            return Err(StoreError::backend(format!(
                "movement for item {} appended inside transaction for item {}",
                movement.item_id, self.item_id
            )));
        }

        // Like a database sequence: gaps are possible when a transaction rolls back.
        let sequence = self.shared.last_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = Movement {
            id: MovementId::new(),
            sequence,
            item_id: movement.item_id,
            direction: movement.direction,
            quantity: movement.quantity,
            reason: movement.reason,
            recorded_at: Utc::now(),
        };
        self.staged_movements.push(stored.clone());
        Ok(stored)
    }

    async fn write_balance(&mut self, quantity: i64) -> Result<(), StoreError> {
        if quantity < 0 {
            return Err(StoreError::backend(format!(
                "balance for item {} cannot be negative ({quantity})",
                self.item_id
            )));
        }
        self.staged_balance = Some(quantity);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut tables = this.shared.tables.write().map_err(|_| poisoned())?;

        if let Some(registry) = &this.shared.registry {
            if !registry.contains(this.item_id)? {
                return Err(StoreError::MissingItem);
            }
        }

        if !this.staged_movements.is_empty() {
            tables
                .movements
                .entry(this.item_id)
                .or_default()
                .extend(this.staged_movements);
        }
        if let Some(quantity) = this.staged_balance {
            tables.balances.insert(this.item_id, quantity);
        }

        // Row lock is released when `_guard` drops, after the tables are updated.
        drop(tables);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Staged writes are simply discarded.
        Ok(())
    }
}
