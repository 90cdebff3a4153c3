//! Storage boundary for the ledger.
//!
//! Two logical tables live behind [`StockStore`]: the balance table
//! ([`BalanceProjector`]) and the append-only movement ledger
//! ([`MovementLedger`]). Both are written only inside a [`StockTransaction`],
//! which holds the exclusive lock on one item's balance row until it commits
//! or rolls back. The [`ItemRegistry`] is a read-only collaborator.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryItemRegistry, InMemoryStockStore};
pub use postgres::{PostgresItemRegistry, PostgresStockStore};
pub use r#trait::{
    BalanceProjector, ItemRegistry, MovementLedger, StockStore, StockTransaction, StoreError,
};
