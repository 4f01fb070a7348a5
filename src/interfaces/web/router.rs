use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use serde_json::Value;
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{agents, channels, features, internal, messages, users};
use super::ws;
use crate::interfaces::mcp;

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
        "http://127.0.0.1:3000".to_string(),
        "http://localhost:3000".to_string(),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
}

pub(crate) fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/users", get(users::list_users).post(users::onboard_user))
        .route("/api/users/me", get(users::get_me))
        .route(
            "/api/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route("/api/channels/{channel_id}", get(channels::get_channel))
        .route(
            "/api/channels/{channel_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/api/agents", get(agents::list_agents))
        .route("/api/agents/{agent_name}", get(agents::get_agent))
        .route("/api/agents/{agent_name}/dm", post(agents::get_or_create_dm))
        .route(
            "/api/features",
            get(features::list_features).post(features::create_feature),
        )
        .route("/api/features/{feature_id}/vote", post(features::vote_feature))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .route("/_internal/broadcast", post(internal::broadcast_endpoint))
        .route("/mcp", post(mcp::mcp_endpoint))
        .route("/ws", get(ws::ws_handler))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state.store.healthy().await;
    Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": if db_ok { "ok" } else { "error" },
        "ws_clients": state.broadcaster.receiver_count(),
    }))
}
