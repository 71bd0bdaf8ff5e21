pub mod events;
pub mod health;

use agenda_core::AgendaError;
use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::error;

pub type ApiError = (StatusCode, Json<Value>);

/// Map a domain error to a status code and a `{error, code}` body.
pub fn api_error(err: AgendaError) -> ApiError {
    let status = match &err {
        AgendaError::Validation(_) => StatusCode::BAD_REQUEST,
        AgendaError::EventNotFound { .. } => StatusCode::NOT_FOUND,
        _ => {
            error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(json!({ "error": err.to_string(), "code": err.code() })),
    )
}
