use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use stockledger_core::ItemId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Every registered item with its balance, ordered by name.
pub async fn list_stock_levels(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.stock_levels().await {
        Ok(levels) => (StatusCode::OK, Json(levels)).into_response(),
        Err(e) => errors::movement_error_to_response(e),
    }
}

pub async fn get_item_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_item_id(),
    };

    match services.balance(item_id).await {
        Ok(balance) => (StatusCode::OK, Json(dto::BalanceResponse::from(balance))).into_response(),
        Err(e) => errors::movement_error_to_response(e),
    }
}
