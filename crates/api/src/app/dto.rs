use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::ItemId;
use stockledger_infra::coordinator::AppliedMovement;
use stockledger_inventory::{Balance, Direction, Movement, MovementRequest};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateMovementRequest {
    pub item_id: String,
    pub direction: String,
    /// Kept raw so that non-integers are reported as an invalid quantity.
    pub quantity: serde_json::Value,
    pub reason: Option<String>,
}

impl CreateMovementRequest {
    /// Parse identifiers, direction and quantity type; the quantity's sign is
    /// validated by the coordinator.
    pub fn into_domain(self) -> Result<MovementRequest, axum::response::Response> {
        let item_id: ItemId = self.item_id.parse().map_err(|_| errors::invalid_item_id())?;
        let direction = Direction::parse(&self.direction.to_ascii_lowercase()).ok_or_else(|| {
            errors::json_error(
                axum::http::StatusCode::BAD_REQUEST,
                "invalid_direction",
                "direction must be one of: inbound, outbound",
            )
        })?;

        let quantity = self
            .quantity
            .as_i64()
            .ok_or_else(|| errors::non_integer_quantity(&self.quantity))?;

        let request = MovementRequest::new(item_id, direction, quantity);
        Ok(match self.reason {
            Some(reason) => request.with_reason(reason),
            None => request,
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct MovementCreatedResponse {
    pub item_id: ItemId,
    pub movement_id: String,
    pub sequence: u64,
    pub new_balance: i64,
}

impl From<AppliedMovement> for MovementCreatedResponse {
    fn from(applied: AppliedMovement) -> Self {
        Self {
            item_id: applied.movement.item_id,
            movement_id: applied.movement.id.to_string(),
            sequence: applied.movement.sequence,
            new_balance: applied.new_balance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub item_id: ItemId,
    pub quantity: i64,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            item_id: balance.item_id,
            quantity: balance.quantity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MovementResponse {
    pub movement_id: String,
    pub sequence: u64,
    pub direction: Direction,
    pub quantity: i64,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl From<Movement> for MovementResponse {
    fn from(m: Movement) -> Self {
        Self {
            movement_id: m.id.to_string(),
            sequence: m.sequence,
            direction: m.direction,
            quantity: m.quantity.get(),
            reason: m.reason,
            recorded_at: m.recorded_at,
        }
    }
}
