use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ItemId, MovementError, MovementId, ValueObject};

/// Which way stock moves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    /// Parse the storage representation produced by [`Direction::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(Direction::Inbound),
            "outbound" => Some(Direction::Outbound),
            _ => None,
        }
    }

    /// Apply this direction's sign to an unsigned amount.
    pub fn signed(self, quantity: Quantity) -> i64 {
        match self {
            Direction::Inbound => quantity.get(),
            Direction::Outbound => -quantity.get(),
        }
    }

    fn default_reason(self) -> &'static str {
        match self {
            Direction::Inbound => "Stock inbound",
            Direction::Outbound => "Stock outbound",
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strictly positive movement quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(i64);

impl Quantity {
    pub fn new(value: i64) -> Result<Self, MovementError> {
        if value <= 0 {
            return Err(MovementError::InvalidQuantity(value));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl ValueObject for Quantity {}

impl TryFrom<i64> for Quantity {
    type Error = MovementError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for i64 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

/// A caller's request to move stock, as received from the presentation layer.
///
/// The quantity is kept raw here so that validation happens in one place
/// ([`MovementRequest::quantity`]) before anything touches storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub item_id: ItemId,
    pub direction: Direction,
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

impl MovementRequest {
    pub fn new(item_id: ItemId, direction: Direction, quantity: i64) -> Self {
        Self {
            item_id,
            direction,
            quantity,
            reason: None,
        }
    }

    pub fn inbound(item_id: ItemId, quantity: i64) -> Self {
        Self::new(item_id, Direction::Inbound, quantity)
    }

    pub fn outbound(item_id: ItemId, quantity: i64) -> Self {
        Self::new(item_id, Direction::Outbound, quantity)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Validated quantity, or `InvalidQuantity`.
    pub fn quantity(&self) -> Result<Quantity, MovementError> {
        Quantity::new(self.quantity)
    }

    /// Reason to record; blank or missing reasons fall back to a per-direction default.
    pub fn reason(&self) -> String {
        match self.reason.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => r.to_string(),
            _ => self.direction.default_reason().to_string(),
        }
    }
}

/// A validated movement ready to be appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub item_id: ItemId,
    pub direction: Direction,
    pub quantity: Quantity,
    pub reason: String,
}

impl NewMovement {
    pub fn new(item_id: ItemId, direction: Direction, quantity: Quantity, reason: impl Into<String>) -> Self {
        Self {
            item_id,
            direction,
            quantity,
            reason: reason.into(),
        }
    }

    pub fn signed_quantity(&self) -> i64 {
        self.direction.signed(self.quantity)
    }
}

/// An accepted movement as recorded in the append-only ledger.
///
/// Never updated or deleted. Corrections are new, compensating movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    /// Ledger-wide, monotonically increasing position assigned on append.
    pub sequence: u64,
    pub item_id: ItemId,
    pub direction: Direction,
    pub quantity: Quantity,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl Movement {
    pub fn signed_quantity(&self) -> i64 {
        self.direction.signed(self.quantity)
    }
}
