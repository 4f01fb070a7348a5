use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_derive::Deserialize;
use serde_json::Value;

use super::super::AppState;
use super::error_response;
use crate::core::broadcast::channel_created_event;

pub(crate) async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let channels = state
        .store
        .list_channels()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok(Json(serde_json::json!(channels)))
}

pub(crate) async fn get_channel(
    Path(channel_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let channel = state
        .store
        .get_channel(&channel_id)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Channel not found"))?;
    Ok(Json(serde_json::json!(channel)))
}

#[derive(Deserialize)]
pub(crate) struct ChannelCreate {
    name: String,
}

pub(crate) async fn create_channel(
    State(state): State<AppState>,
    Json(payload): Json<ChannelCreate>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let mut name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "name is required"));
    }
    if !name.starts_with('#') {
        name = format!("#{name}");
    }

    if state
        .store
        .get_channel_by_name(&name)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .is_some()
    {
        return Err(error_response(
            StatusCode::CONFLICT,
            &format!("Channel {name} already exists"),
        ));
    }

    let created_by = state
        .store
        .human_user()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .map(|u| u.id)
        .unwrap_or_else(|| "system".to_string());

    let channel = state
        .store
        .create_channel(&name, "custom", None, &created_by)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    state.broadcaster.emit(channel_created_event(
        &channel.id,
        &channel.name,
        &channel.channel_type,
        channel.project_path.as_deref(),
    ));

    Ok((StatusCode::CREATED, Json(serde_json::json!(channel))))
}
