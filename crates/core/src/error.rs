//! Error model for stock movements.

use serde::Serialize;
use thiserror::Error;

use crate::id::ItemId;

/// Identifier failed to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid identifier: {0}")]
pub struct InvalidId(pub String);

/// Why a movement request was rejected.
///
/// Every variant except `StorageFailure` is an expected business outcome and is
/// returned with the ledger and balances untouched. The `Display` text is meant
/// to be shown to the end user verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MovementError {
    /// Quantity was zero or negative. Checked before any storage access.
    #[error("quantity must be a positive integer (got {0})")]
    InvalidQuantity(i64),

    /// The item does not exist in the registry.
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    /// Outbound quantity exceeds the current balance.
    #[error("insufficient balance ({available}) for an outbound movement of {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    /// Outbound movement would push the balance below the item's floor.
    #[error(
        "outbound movement of {requested} would leave {remaining}, below the minimum stock of {minimum}"
    )]
    BelowMinimumThreshold {
        requested: i64,
        remaining: i64,
        minimum: i64,
    },

    /// The balance lock could not be acquired in time.
    #[error("timed out after {waited_ms}ms waiting for the item's balance lock")]
    Timeout { waited_ms: u64 },

    /// The transaction could not commit for an infrastructure reason.
    ///
    /// `detail` is for logs; the rendered message stays generic.
    #[error("failed to record the movement, please try again")]
    StorageFailure { detail: String },
}

/// Stable, machine-readable classification of a [`MovementError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementErrorKind {
    InvalidQuantity,
    ItemNotFound,
    InsufficientBalance,
    BelowMinimumThreshold,
    Timeout,
    StorageFailure,
}

impl MovementErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementErrorKind::InvalidQuantity => "invalid_quantity",
            MovementErrorKind::ItemNotFound => "item_not_found",
            MovementErrorKind::InsufficientBalance => "insufficient_balance",
            MovementErrorKind::BelowMinimumThreshold => "below_minimum_threshold",
            MovementErrorKind::Timeout => "timeout",
            MovementErrorKind::StorageFailure => "storage_failure",
        }
    }
}

impl MovementError {
    pub fn storage(detail: impl Into<String>) -> Self {
        Self::StorageFailure {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> MovementErrorKind {
        match self {
            MovementError::InvalidQuantity(_) => MovementErrorKind::InvalidQuantity,
            MovementError::ItemNotFound(_) => MovementErrorKind::ItemNotFound,
            MovementError::InsufficientBalance { .. } => MovementErrorKind::InsufficientBalance,
            MovementError::BelowMinimumThreshold { .. } => {
                MovementErrorKind::BelowMinimumThreshold
            }
            MovementError::Timeout { .. } => MovementErrorKind::Timeout,
            MovementError::StorageFailure { .. } => MovementErrorKind::StorageFailure,
        }
    }

    /// `true` for outcomes the business rules produce on purpose.
    pub fn is_business_outcome(&self) -> bool {
        !matches!(self, MovementError::StorageFailure { .. })
    }
}
