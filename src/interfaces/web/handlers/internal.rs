use axum::Json;
use axum::extract::State;
use serde_json::Value;

use super::super::AppState;

/// Cross-process event injection: another local process (e.g. a standalone
/// MCP server) posts a pre-built event here and it is fanned out to every
/// WebSocket client. Local-only, so no auth.
pub(crate) async fn broadcast_endpoint(
    State(state): State<AppState>,
    Json(event): Json<Value>,
) -> Json<Value> {
    state.broadcaster.emit_raw(event);
    Json(serde_json::json!({ "status": "ok" }))
}
