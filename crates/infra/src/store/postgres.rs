//! Postgres-backed stock store and item registry.
//!
//! The balance row is locked with `SELECT ... FOR UPDATE` for the lifetime of
//! the transaction, so two movements on the same item are serialized by the
//! database instead of racing on a stale read. Lock waits are bounded by a
//! transaction-local `lock_timeout`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (lock not available) | `55P03` | `LockTimeout` | Another movement held the row longer than `lock_timeout` |
//! | Database (foreign key violation) | `23503` | `MissingItem` | Item deleted between registry lookup and write |
//! | Database (check constraint violation) | `23514` | `Backend` | Negative balance or non-positive quantity reached the table |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolTimedOut | N/A | `LockTimeout` | No pooled connection freed up within the lock timeout |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | Other | N/A | `Backend` | Network errors, decode failures, etc. |

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};

use stockledger_core::{ItemId, MovementId};
use stockledger_inventory::{Balance, Direction, Item, Movement, NewMovement, Quantity};

use super::r#trait::{
    BalanceProjector, ItemRegistry, MovementLedger, StockStore, StockTransaction, StoreError,
};

/// Bundled, idempotent DDL for the ledger tables.
pub const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

/// Postgres-backed balance table + movement ledger.
///
/// ## Thread Safety
///
/// Uses SQLx connection pool which is thread-safe (Arc + Send + Sync). Each
/// transaction checks out its own connection and returns it on commit,
/// rollback, or drop.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    /// Create a new PostgresStockStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool whose checkouts give up after `acquire_timeout`.
    ///
    /// Pass the lock timeout here so that waiting for a free connection is
    /// bounded the same way as waiting for a row.
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema (`CREATE ... IF NOT EXISTS`).
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl BalanceProjector for PostgresStockStore {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn balance(&self, item_id: ItemId) -> Result<Option<Balance>, StoreError> {
        let quantity: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM balances WHERE item_id = $1")
                .bind(item_id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_balance", e))?;

        Ok(quantity.map(|quantity| Balance { item_id, quantity }))
    }

    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn balances(&self) -> Result<Vec<Balance>, StoreError> {
        let rows = sqlx::query("SELECT item_id, quantity FROM balances ORDER BY item_id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_balances", e))?;

        Span::current().record("row_count", rows.len());

        rows.into_iter()
            .map(|row| {
                let item_id: uuid::Uuid = row.try_get("item_id").map_err(decode_error)?;
                let quantity: i64 = row.try_get("quantity").map_err(decode_error)?;
                Ok(Balance {
                    item_id: ItemId::from_uuid(item_id),
                    quantity,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MovementLedger for PostgresStockStore {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                sequence,
                movement_id,
                item_id,
                direction,
                quantity,
                reason,
                recorded_at
            FROM movements
            WHERE item_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        rows.iter()
            .map(|row| Movement::try_from(MovementRow::from_row(row).map_err(decode_error)?))
            .collect()
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    #[instrument(
        skip(self),
        fields(item_id = %item_id, lock_timeout_ms = lock_timeout.as_millis() as u64),
        err
    )]
    async fn lock_balance(
        &self,
        item_id: ItemId,
        lock_timeout: Duration,
    ) -> Result<Box<dyn StockTransaction>, StoreError> {
        // Checking out a connection counts against the same bound as the row lock.
        let started = Instant::now();
        let mut tx = tokio::time::timeout(lock_timeout, self.pool.begin())
            .await
            .map_err(|_| StoreError::LockTimeout)?
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let remaining = lock_timeout.saturating_sub(started.elapsed());

        // Transaction-local: reverts on commit/rollback.
        let timeout_ms = remaining.as_millis().clamp(1, i32::MAX as u128);
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{timeout_ms}ms"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        // Lazy creation under the same lock: the inserted row is locked by us
        // until commit, and a concurrent first insert waits on the conflict.
        let created = sqlx::query(
            r#"
            INSERT INTO balances (item_id, quantity)
            VALUES ($1, 0)
            ON CONFLICT (item_id) DO NOTHING
            RETURNING item_id
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_balance_row", e))?
        .is_some();

        let current: i64 =
            sqlx::query_scalar("SELECT quantity FROM balances WHERE item_id = $1 FOR UPDATE")
                .bind(item_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("lock_balance_row", e))?;

        Ok(Box::new(PostgresTransaction {
            tx,
            item_id,
            current,
            created,
        }))
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    item_id: ItemId,
    current: i64,
    created: bool,
}

#[async_trait]
impl StockTransaction for PostgresTransaction {
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

        let movement_id = MovementId::new();
        let row = sqlx::query(
            r#"
            INSERT INTO movements (movement_id, item_id, direction, quantity, reason)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING sequence, recorded_at
            "#,
        )
        .bind(movement_id.as_uuid())
        .bind(movement.item_id.as_uuid())
        .bind(movement.direction.as_str())
        .bind(movement.quantity.get())
        .bind(&movement.reason)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        let sequence: i64 = row.try_get("sequence").map_err(decode_error)?;
        let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(decode_error)?;

        Ok(Movement {
            id: movement_id,
            sequence: sequence as u64,
            item_id: movement.item_id,
            direction: movement.direction,
            quantity: movement.quantity,
            reason: movement.reason,
            recorded_at,
        })
    }

    async fn write_balance(&mut self, quantity: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE balances SET quantity = $2, updated_at = clock_timestamp() WHERE item_id = $1",
        )
        .bind(self.item_id.as_uuid())
        .bind(quantity)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_balance", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::backend(format!(
                "balance row for item {} vanished while locked",
                self.item_id
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Read-only item registry over the `items` table.
#[derive(Debug, Clone)]
pub struct PostgresItemRegistry {
    pool: Arc<PgPool>,
}

impl PostgresItemRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ItemRegistry for PostgresItemRegistry {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query("SELECT id, name, minimum_stock FROM items WHERE id = $1")
            .bind(item_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query("SELECT id, name, minimum_stock FROM items")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter().map(item_from_row).collect()
    }
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<Item, StoreError> {
    let id: uuid::Uuid = row.try_get("id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let minimum_stock: i32 = row.try_get("minimum_stock").map_err(decode_error)?;
    let minimum_stock = u32::try_from(minimum_stock).map_err(|_| {
        StoreError::backend(format!("item {id} has a negative minimum_stock ({minimum_stock})"))
    })?;
    Ok(Item {
        id: ItemId::from_uuid(id),
        name,
        minimum_stock,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // lock_not_available
                Some("55P03") => StoreError::LockTimeout,
                // foreign_key_violation
                Some("23503") => StoreError::MissingItem,
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::LockTimeout,
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {}", err))
}

// SQLx row types

#[derive(Debug)]
struct MovementRow {
    sequence: i64,
    movement_id: uuid::Uuid,
    item_id: uuid::Uuid,
    direction: String,
    quantity: i64,
    reason: String,
    recorded_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for MovementRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            sequence: row.try_get("sequence")?,
            movement_id: row.try_get("movement_id")?,
            item_id: row.try_get("item_id")?,
            direction: row.try_get("direction")?,
            quantity: row.try_get("quantity")?,
            reason: row.try_get("reason")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let direction = Direction::parse(&row.direction).ok_or_else(|| {
            StoreError::backend(format!(
                "movement {} has unknown direction '{}'",
                row.sequence, row.direction
            ))
        })?;
        let quantity = Quantity::new(row.quantity).map_err(|e| {
            StoreError::backend(format!("movement {} is corrupt: {}", row.sequence, e))
        })?;

        Ok(Movement {
            id: MovementId::from_uuid(row.movement_id),
            sequence: row.sequence as u64,
            item_id: ItemId::from_uuid(row.item_id),
            direction,
            quantity,
            reason: row.reason,
            recorded_at: row.recorded_at,
        })
    }
}
