use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use stockledger_core::ItemId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn create_movement(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text()),
    };

    let request = match body.into_domain() {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.apply_movement(request).await {
        Ok(applied) => (
            StatusCode::CREATED,
            Json(dto::MovementCreatedResponse::from(applied)),
        )
            .into_response(),
        Err(e) => errors::movement_error_to_response(e),
    }
}

pub async fn list_item_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_item_id(),
    };

    match services.movements(item_id).await {
        Ok(movements) => {
            let body: Vec<dto::MovementResponse> =
                movements.into_iter().map(dto::MovementResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::movement_error_to_response(e),
    }
}
