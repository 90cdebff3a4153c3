use axum::{
    routing::{get, post},
    Router,
};

pub mod balances;
pub mod movements;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/movements", post(movements::create_movement))
        .route("/balances", get(balances::list_stock_levels))
        .route("/items/:id/balance", get(balances::get_item_balance))
        .route("/items/:id/movements", get(movements::list_item_movements))
}
