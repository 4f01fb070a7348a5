use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_derive::Deserialize;
use serde_json::Value;

use super::super::AppState;
use super::error_response;
use crate::core::broadcast::feature_update_event;

pub(crate) async fn list_features(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let features = state
        .store
        .list_features()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok(Json(serde_json::json!(features)))
}

#[derive(Deserialize)]
pub(crate) struct FeatureCreate {
    title: String,
    description: String,
}

pub(crate) async fn create_feature(
    State(state): State<AppState>,
    Json(payload): Json<FeatureCreate>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let user = state
        .store
        .human_user()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "No user onboarded"))?;

    let feature = state
        .store
        .create_feature(&payload.title, &payload.description, &user.id)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    state.broadcaster.emit(feature_update_event(
        &feature.id,
        &feature.title,
        &feature.status,
        0,
        "created",
    ));

    Ok((StatusCode::CREATED, Json(serde_json::json!(feature))))
}

#[derive(Deserialize)]
pub(crate) struct VoteRequest {
    vote: i64,
}

pub(crate) async fn vote_feature(
    Path(feature_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if payload.vote != 1 && payload.vote != -1 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Vote must be +1 or -1",
        ));
    }

    let feature = state
        .store
        .get_feature(&feature_id)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Feature not found"))?;

    let user = state
        .store
        .human_user()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "No user onboarded"))?;

    let vote_count = state
        .store
        .cast_vote(&feature_id, &user.id, payload.vote)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    state.broadcaster.emit(feature_update_event(
        &feature_id,
        &feature.title,
        &feature.status,
        vote_count,
        "voted",
    ));

    Ok(Json(serde_json::json!({
        "status": "voted",
        "vote": payload.vote,
        "vote_count": vote_count,
    })))
}
