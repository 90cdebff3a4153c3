//! `stockledger-core` — shared building blocks for the stock ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod value_object;

pub use error::{InvalidId, MovementError, MovementErrorKind};
pub use id::{ItemId, MovementId};
pub use value_object::ValueObject;
