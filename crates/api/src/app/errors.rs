use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_core::{MovementError, MovementErrorKind};

pub fn movement_error_to_response(err: MovementError) -> axum::response::Response {
    let status = match &err {
        MovementError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
        MovementError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        MovementError::InsufficientBalance { .. } | MovementError::BelowMinimumThreshold { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        MovementError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        MovementError::StorageFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    // Display of StorageFailure is already generic; the detail stays in the logs.
    json_error(status, err.kind().as_str(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_item_id() -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id")
}

pub fn non_integer_quantity(value: &serde_json::Value) -> axum::response::Response {
    json_error(
        StatusCode::BAD_REQUEST,
        MovementErrorKind::InvalidQuantity.as_str(),
        format!("quantity must be a positive integer (got {value})"),
    )
}
