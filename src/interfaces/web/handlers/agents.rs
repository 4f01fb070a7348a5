use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::Value;

use super::super::AppState;
use super::error_response;
use crate::core::ghost::compute_ghost;
use crate::core::store::types::AgentRecord;

/// Agent as the frontend sees it: the stored record plus a freshly computed
/// ghost verdict. The cached `status` column is advisory only.
async fn agent_json(state: &AppState, agent: &AgentRecord, ps_output: Option<&str>) -> Value {
    let is_ghost = match ps_output {
        Some(ps) => {
            let sessions = state
                .store
                .active_sessions(&agent.id)
                .await
                .unwrap_or_default();
            compute_ghost(state.probe.as_ref(), agent, &sessions, ps)
        }
        // Process table unavailable: fail open, never display a false ghost
        None => false,
    };

    let mut json = serde_json::json!(agent);
    if let Some(obj) = json.as_object_mut() {
        obj.insert("is_ghost".to_string(), Value::Bool(is_ghost));
    }
    json
}

pub(crate) async fn list_agents(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let agents = state
        .store
        .list_agents()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    // One snapshot shared across every agent in the listing
    let ps_output = state.probe.process_table().await.ok();

    let mut out = Vec::with_capacity(agents.len());
    for agent in &agents {
        out.push(agent_json(&state, agent, ps_output.as_deref()).await);
    }
    Ok(Json(Value::Array(out)))
}

pub(crate) async fn get_agent(
    Path(agent_name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let agent = state
        .store
        .get_agent(&agent_name)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Agent not found"))?;

    let ps_output = state.probe.process_table().await.ok();
    Ok(Json(agent_json(&state, &agent, ps_output.as_deref()).await))
}

/// Get-or-create the `#dm-{agent}` channel for direct messages.
pub(crate) async fn get_or_create_dm(
    Path(agent_name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .store
        .get_agent(&agent_name)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Agent not found"))?;

    let created_by = state
        .store
        .human_user()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .map(|u| u.id)
        .unwrap_or_else(|| "system".to_string());

    let channel = state
        .store
        .get_or_create_dm(&agent_name, &created_by)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok(Json(serde_json::json!(channel)))
}
