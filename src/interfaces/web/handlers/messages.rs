use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_derive::Deserialize;
use serde_json::Value;

use super::super::AppState;
use super::error_response;
use crate::core::broadcast::new_message_event;
use crate::core::invoker::{DispatchParams, extract_mentions};

#[derive(Deserialize)]
pub(crate) struct MessageListQuery {
    limit: Option<usize>,
    before: Option<String>,
}

pub(crate) async fn list_messages(
    Path(channel_id): Path<String>,
    Query(query): Query<MessageListQuery>,
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .store
        .get_channel(&channel_id)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Channel not found"))?;

    let limit = query.limit.unwrap_or(50).min(100);
    let messages = state
        .store
        .list_messages(&channel_id, limit, query.before.as_deref())
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok(Json(serde_json::json!(messages)))
}

#[derive(Deserialize)]
pub(crate) struct MessageCreate {
    content: String,
    mentions: Option<Vec<String>>,
    parent_id: Option<String>,
}

/// Persist a message from the human operator, broadcast it, and kick off
/// agent invocation as a detached background unit. The response never waits
/// on any invocation.
pub(crate) async fn send_message(
    Path(channel_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<MessageCreate>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let channel = state
        .store
        .get_channel(&channel_id)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Channel not found"))?;

    let sender = state
        .store
        .human_user()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "No user onboarded"))?;

    let mentions = match &payload.mentions {
        Some(m) => m.clone(),
        None => extract_mentions(&state.store, &payload.content)
            .await
            .unwrap_or_default(),
    };

    let msg = state
        .store
        .insert_message(
            &channel_id,
            &sender.id,
            &payload.content,
            Some(&mentions),
            payload.parent_id.as_deref(),
        )
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    // Persistence precedes the broadcast, which precedes any invocation
    state.broadcaster.emit(new_message_event(
        &msg.id,
        &msg.channel_id,
        &msg.sender_id,
        &sender.name,
        &msg.content,
        msg.mentions.as_deref(),
        msg.parent_id.as_deref(),
        &msg.created_at,
    ));

    state.dispatcher.spawn_dispatch(
        &state.tasks,
        DispatchParams {
            channel_id: channel_id.clone(),
            channel_name: channel.name.clone(),
            content: payload.content.clone(),
            sender_name: sender
                .display_name
                .clone()
                .unwrap_or_else(|| sender.name.clone()),
            mentions: (!mentions.is_empty()).then_some(mentions),
        },
    );

    Ok((StatusCode::CREATED, Json(serde_json::json!(msg))))
}
