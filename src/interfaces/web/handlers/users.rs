use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_derive::Deserialize;
use serde_json::Value;

use super::super::AppState;
use super::error_response;

pub(crate) async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let users = state
        .store
        .list_users()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok(Json(serde_json::json!(users)))
}

#[derive(Deserialize)]
pub(crate) struct OnboardRequest {
    name: String,
    display_name: Option<String>,
    about: Option<String>,
    agent_instructions: Option<String>,
}

/// Onboard the single human operator. Idempotent on the second call: the
/// existing human is returned unchanged.
pub(crate) async fn onboard_user(
    State(state): State<AppState>,
    Json(payload): Json<OnboardRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if payload.name.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "name is required"));
    }

    if let Some(existing) = state
        .store
        .human_user()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
    {
        return Ok((StatusCode::OK, Json(serde_json::json!(existing))));
    }

    let user = state
        .store
        .create_user(
            payload.name.trim(),
            "human",
            payload.display_name.as_deref(),
            payload.about.as_deref(),
            payload.agent_instructions.as_deref(),
        )
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    Ok((StatusCode::CREATED, Json(serde_json::json!(user))))
}

pub(crate) async fn get_me(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = state
        .store
        .human_user()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "No user onboarded"))?;
    Ok(Json(serde_json::json!(user)))
}
