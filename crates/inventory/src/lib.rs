//! Stock ledger domain module.
//!
//! This crate contains the business rules for stock movements, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod balance;
pub mod item;
pub mod movement;
pub mod reconcile;

pub use balance::{next_balance, Balance, StockLevel};
pub use item::Item;
pub use movement::{Direction, Movement, MovementRequest, NewMovement, Quantity};
pub use reconcile::{replay, Reconciliation};
