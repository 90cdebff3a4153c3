//! Movement execution pipeline (application-level orchestration).
//!
//! The `MovementCoordinator` is the only writer of the ledger. Every request
//! runs as one transaction on one item:
//!
//! ```text
//! MovementRequest
//!   ↓
//! 0. Validate quantity (no storage access)
//!   ↓
//! 1. Look up the item in the registry
//!   ↓
//! 2. Lock the item's balance row (created at zero if missing)
//!   ↓
//! 3. Read the balance under the lock
//!   ↓
//! 4/5. Decide the new balance (pure domain rule)
//!   ↓
//! 6. Append the movement to the ledger
//!   ↓
//! 7. Write the new balance
//!   ↓
//! 8. Commit (or roll back everything)
//! ```
//!
//! An item removed from the registry after step 1 is caught by the store when
//! it writes under the lock, and surfaces as `ItemNotFound`.
//!
//! Business rejections roll back before anything is written, storage failures
//! roll back whatever was staged. Dropping the returned future before it
//! completes drops the transaction, which also rolls back.

use std::time::Duration;

use tracing::{error, info, instrument, warn};

use stockledger_core::{ItemId, MovementError};
use stockledger_inventory::{
    next_balance, Balance, Movement, MovementRequest, NewMovement, StockLevel,
};

use crate::store::{ItemRegistry, StockStore, StockTransaction, StoreError};

/// Successful outcome of [`MovementCoordinator::apply_movement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMovement {
    /// The ledger row that was appended.
    pub movement: Movement,
    /// Balance after the movement, as committed.
    pub new_balance: i64,
}

/// Service entry point for stock movements.
///
/// ## Generic Parameters
///
/// - `R`: item registry (read-only collaborator)
/// - `S`: stock store holding the balance table and the ledger
#[derive(Debug)]
pub struct MovementCoordinator<R, S> {
    registry: R,
    store: S,
    lock_timeout: Duration,
}

impl<R, S> MovementCoordinator<R, S> {
    pub fn new(registry: R, store: S, lock_timeout: Duration) -> Self {
        Self {
            registry,
            store,
            lock_timeout,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn map_store_error(&self, item_id: ItemId, err: StoreError) -> MovementError {
        match err {
            StoreError::LockTimeout => MovementError::Timeout {
                waited_ms: u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX),
            },
            StoreError::MissingItem => MovementError::ItemNotFound(item_id),
            StoreError::Backend(detail) => MovementError::storage(detail),
        }
    }
}

impl<R, S> MovementCoordinator<R, S>
where
    R: ItemRegistry,
    S: StockStore,
{
    /// Record one inbound or outbound movement and return the new balance.
    ///
    /// On any error the ledger and the balance table are left exactly as they
    /// were. `InvalidQuantity` is detected before the registry or the store is
    /// touched.
    #[instrument(
        skip(self, request),
        fields(
            item_id = %request.item_id,
            direction = %request.direction,
            quantity = request.quantity
        )
    )]
    pub async fn apply_movement(
        &self,
        request: MovementRequest,
    ) -> Result<AppliedMovement, MovementError> {
        let result = self.execute(&request).await;
        match &result {
            Ok(applied) => info!(
                sequence = applied.movement.sequence,
                new_balance = applied.new_balance,
                "movement recorded"
            ),
            Err(e @ MovementError::Timeout { .. }) => warn!("movement rejected: {e}"),
            Err(e) if e.is_business_outcome() => {
                info!(kind = e.kind().as_str(), "movement rejected: {e}")
            }
            Err(MovementError::StorageFailure { detail }) => {
                error!(detail = %detail, "movement failed in storage")
            }
            Err(_) => {}
        }
        result
    }

    async fn execute(&self, request: &MovementRequest) -> Result<AppliedMovement, MovementError> {
        let item_id = request.item_id;
        let quantity = request.quantity()?;

        let item = self
            .registry
            .get_item(item_id)
            .await
            .map_err(|e| self.map_store_error(item_id, e))?
            .ok_or(MovementError::ItemNotFound(item_id))?;

        let mut tx = self
            .store
            .lock_balance(item_id, self.lock_timeout)
            .await
            .map_err(|e| self.map_store_error(item_id, e))?;

        let current = tx.current_balance();
        let new_balance = match next_balance(current, &item, request.direction, quantity) {
            Ok(b) => b,
            Err(e) => {
                abort(tx).await;
                return Err(e);
            }
        };

        let staged = async {
            let movement = tx
                .append_movement(NewMovement::new(
                    item_id,
                    request.direction,
                    quantity,
                    request.reason(),
                ))
                .await?;
            tx.write_balance(new_balance).await?;
            Ok::<_, StoreError>(movement)
        }
        .await;

        let movement = match staged {
            Ok(m) => m,
            Err(e) => {
                abort(tx).await;
                return Err(self.map_store_error(item_id, e));
            }
        };

        tx.commit()
            .await
            .map_err(|e| self.map_store_error(item_id, e))?;

        Ok(AppliedMovement {
            movement,
            new_balance,
        })
    }

    /// Current balance of a registered item (zero if it never moved).
    pub async fn balance(&self, item_id: ItemId) -> Result<Balance, MovementError> {
        self.ensure_item(item_id).await?;
        let stored = self
            .store
            .balance(item_id)
            .await
            .map_err(|e| self.map_store_error(item_id, e))?;
        Ok(stored.unwrap_or(Balance::zero(item_id)))
    }

    /// Ledger of a registered item, oldest first.
    pub async fn movements(&self, item_id: ItemId) -> Result<Vec<Movement>, MovementError> {
        self.ensure_item(item_id).await?;
        self.store
            .movements(item_id)
            .await
            .map_err(|e| self.map_store_error(item_id, e))
    }

    /// Every registered item with its current balance, ordered by name.
    pub async fn stock_levels(&self) -> Result<Vec<StockLevel>, MovementError> {
        let items = self
            .registry
            .list_items()
            .await
            .map_err(|e| MovementError::storage(e.to_string()))?;
        let balances = self
            .store
            .balances()
            .await
            .map_err(|e| MovementError::storage(e.to_string()))?;

        let mut levels: Vec<StockLevel> = items
            .iter()
            .map(|item| {
                let quantity = balances
                    .iter()
                    .find(|b| b.item_id == item.id)
                    .map(|b| b.quantity)
                    .unwrap_or(0);
                StockLevel::new(item, quantity)
            })
            .collect();
        levels.sort_by(|a, b| a.name.cmp(&b.name).then(a.item_id.cmp(&b.item_id)));
        Ok(levels)
    }

    async fn ensure_item(&self, item_id: ItemId) -> Result<(), MovementError> {
        match self.registry.get_item(item_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(MovementError::ItemNotFound(item_id)),
            Err(e) => Err(self.map_store_error(item_id, e)),
        }
    }
}

/// Roll back, logging (not propagating) a failed rollback: the caller already
/// has the error that matters, and the backend discards the transaction anyway.
async fn abort(tx: Box<dyn StockTransaction>) {
    let item_id = tx.item_id();
    if let Err(e) = tx.rollback().await {
        warn!(item_id = %item_id, "rollback failed: {e}");
    }
}
