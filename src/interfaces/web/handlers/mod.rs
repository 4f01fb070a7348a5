pub(crate) mod agents;
pub(crate) mod channels;
pub(crate) mod features;
pub(crate) mod internal;
pub(crate) mod messages;
pub(crate) mod users;

use axum::Json;
use axum::http::StatusCode;
use serde_json::Value;

/// Uniform JSON error body.
pub(crate) fn error_response(status: StatusCode, detail: &str) -> (StatusCode, Json<Value>) {
    (status, Json(serde_json::json!({ "detail": detail })))
}
