//! MCP server endpoint: the tool-call surface agents use to register, post,
//! and poll. JSON-RPC 2.0 over a single POST route; per-session state maps
//! the MCP session id to the agent registered on it.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::invoker::{DispatchParams, extract_mentions};
use crate::core::registry;
use crate::interfaces::web::AppState;

pub(crate) const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<Value>, code: i64, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(serde_json::json!({ "code": code, "message": message })),
        }
    }
}

pub(crate) async fn mcp_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (HeaderMap, Json<JsonRpcResponse>) {
    let mut response_headers = HeaderMap::new();

    let request: JsonRpcRequest = match serde_json::from_value(payload) {
        Ok(req) => req,
        Err(e) => {
            return (
                response_headers,
                Json(JsonRpcResponse::err(
                    None,
                    -32700,
                    &format!("parse error: {e}"),
                )),
            );
        }
    };

    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response_headers.insert(SESSION_HEADER, value);
    }

    let id = request.id.clone();
    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::ok(
            id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "talkto", "version": env!("CARGO_PKG_VERSION") },
            }),
        ),
        "notifications/initialized" | "ping" => JsonRpcResponse::ok(id, serde_json::json!({})),
        "tools/list" => JsonRpcResponse::ok(id, serde_json::json!({ "tools": tool_descriptors() })),
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            let tool = params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let args = params
                .get("arguments")
                .cloned()
                .unwrap_or(Value::Object(Default::default()));

            let outcome = call_tool(&state, &session_id, &tool, &args).await;
            if let Some(err) = outcome.get("error") {
                warn!("mcp tool '{}' returned error: {}", tool, err);
            }
            let text = serde_json::to_string(&outcome).unwrap_or_else(|_| "{}".to_string());
            JsonRpcResponse::ok(
                id,
                serde_json::json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": outcome.get("error").is_some(),
                }),
            )
        }
        other => JsonRpcResponse::err(id, -32601, &format!("method not found: {other}")),
    };

    (response_headers, Json(response))
}

fn str_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

async fn registered_agent(state: &AppState, session_id: &str) -> Option<String> {
    state.mcp_sessions.lock().await.get(session_id).cloned()
}

fn err_json(msg: &str) -> Value {
    serde_json::json!({ "error": msg })
}

async fn call_tool(state: &AppState, session_id: &str, tool: &str, args: &Value) -> Value {
    match tool {
        "register" => register_tool(state, session_id, args).await,
        "disconnect" => {
            let Some(agent) = registered_agent(state, session_id).await else {
                return err_json("not registered on this session");
            };
            match registry::disconnect_agent(&state.store, &state.broadcaster, &agent).await {
                Ok(()) => {
                    state.mcp_sessions.lock().await.remove(session_id);
                    serde_json::json!({ "status": "disconnected", "agent_name": agent })
                }
                Err(e) => err_json(&e.to_string()),
            }
        }
        "heartbeat" => {
            let Some(agent) = registered_agent(state, session_id).await else {
                return err_json("not registered on this session");
            };
            match registry::heartbeat_agent(&state.store, &agent).await {
                Ok(()) => serde_json::json!({ "status": "ok" }),
                Err(e) => err_json(&e.to_string()),
            }
        }
        "send_message" => send_message_tool(state, session_id, args).await,
        "get_messages" => get_messages_tool(state, session_id, args).await,
        "create_channel" => {
            let Some(agent) = registered_agent(state, session_id).await else {
                return err_json("not registered on this session");
            };
            let Some(name) = str_arg(args, "name") else {
                return err_json("name is required");
            };
            let name = if name.starts_with('#') { name } else { format!("#{name}") };
            match state.store.get_channel_by_name(&name).await {
                Ok(Some(_)) => err_json(&format!("channel {name} already exists")),
                Ok(None) => match state.store.create_channel(&name, "custom", None, &agent).await {
                    Ok(ch) => {
                        state.broadcaster.emit(crate::core::broadcast::channel_created_event(
                            &ch.id,
                            &ch.name,
                            &ch.channel_type,
                            None,
                        ));
                        serde_json::json!({ "id": ch.id, "name": ch.name, "type": ch.channel_type })
                    }
                    Err(e) => err_json(&e.to_string()),
                },
                Err(e) => err_json(&e.to_string()),
            }
        }
        "join_channel" => {
            let Some(agent) = registered_agent(state, session_id).await else {
                return err_json("not registered on this session");
            };
            let Some(channel_name) = str_arg(args, "channel") else {
                return err_json("channel is required");
            };
            let agent_record = match state.store.get_agent(&agent).await {
                Ok(Some(a)) => a,
                Ok(None) => return err_json("agent record missing"),
                Err(e) => return err_json(&e.to_string()),
            };
            match state.store.get_channel_by_name(&channel_name).await {
                Ok(Some(ch)) => match state.store.join_channel(&ch.id, &agent_record.id).await {
                    Ok(true) => serde_json::json!({ "status": "joined" }),
                    Ok(false) => serde_json::json!({ "status": "already_member" }),
                    Err(e) => err_json(&e.to_string()),
                },
                Ok(None) => err_json(&format!("channel {channel_name} not found")),
                Err(e) => err_json(&e.to_string()),
            }
        }
        "list_channels" => match state.store.list_channels().await {
            Ok(channels) => serde_json::json!({ "channels": channels }),
            Err(e) => err_json(&e.to_string()),
        },
        "list_agents" => match state.store.list_agents().await {
            Ok(agents) => serde_json::json!({ "agents": agents }),
            Err(e) => err_json(&e.to_string()),
        },
        "update_profile" => {
            let Some(agent) = registered_agent(state, session_id).await else {
                return err_json("not registered on this session");
            };
            match registry::update_agent_profile(
                &state.store,
                &agent,
                str_arg(args, "description").as_deref(),
                str_arg(args, "personality").as_deref(),
                str_arg(args, "gender").as_deref(),
            )
            .await
            {
                Ok(updated) => serde_json::json!({
                    "agent_name": updated.agent_name,
                    "description": updated.description,
                    "personality": updated.personality,
                    "gender": updated.gender,
                }),
                Err(e) => err_json(&e.to_string()),
            }
        }
        "create_feature_request" => {
            let Some(agent) = registered_agent(state, session_id).await else {
                return err_json("not registered on this session");
            };
            let (Some(title), Some(description)) =
                (str_arg(args, "title"), str_arg(args, "description"))
            else {
                return err_json("title and description are required");
            };
            let agent_record = match state.store.get_agent(&agent).await {
                Ok(Some(a)) => a,
                Ok(None) => return err_json("agent record missing"),
                Err(e) => return err_json(&e.to_string()),
            };
            match state
                .store
                .create_feature(&title, &description, &agent_record.id)
                .await
            {
                Ok(feature) => {
                    state.broadcaster.emit(crate::core::broadcast::feature_update_event(
                        &feature.id,
                        &feature.title,
                        &feature.status,
                        0,
                        "created",
                    ));
                    serde_json::json!({ "status": "created", "feature_id": feature.id })
                }
                Err(e) => err_json(&e.to_string()),
            }
        }
        "vote_feature" => {
            let Some(agent) = registered_agent(state, session_id).await else {
                return err_json("not registered on this session");
            };
            let vote = args.get("vote").and_then(Value::as_i64).unwrap_or(0);
            if vote != 1 && vote != -1 {
                return err_json("vote must be +1 or -1");
            }
            let Some(feature_id) = str_arg(args, "feature_id") else {
                return err_json("feature_id is required");
            };
            let feature = match state.store.get_feature(&feature_id).await {
                Ok(Some(f)) => f,
                Ok(None) => return err_json(&format!("feature {feature_id} not found")),
                Err(e) => return err_json(&e.to_string()),
            };
            let agent_record = match state.store.get_agent(&agent).await {
                Ok(Some(a)) => a,
                Ok(None) => return err_json("agent record missing"),
                Err(e) => return err_json(&e.to_string()),
            };
            match state
                .store
                .cast_vote(&feature_id, &agent_record.id, vote)
                .await
            {
                Ok(vote_count) => {
                    state.broadcaster.emit(crate::core::broadcast::feature_update_event(
                        &feature.id,
                        &feature.title,
                        &feature.status,
                        vote_count,
                        "voted",
                    ));
                    serde_json::json!({ "status": "voted", "vote": vote, "vote_count": vote_count })
                }
                Err(e) => err_json(&e.to_string()),
            }
        }
        "get_feature_requests" => match state.store.list_features().await {
            Ok(features) => serde_json::json!({ "features": features }),
            Err(e) => err_json(&e.to_string()),
        },
        other => err_json(&format!("unknown tool '{other}'")),
    }
}

/// Register a new agent, or reconnect when `agent_name` names an existing
/// one. A blank provider `session_id` is rejected outright: ghost detection
/// has nothing to probe without it.
async fn register_tool(state: &AppState, session_id: &str, args: &Value) -> Value {
    let Some(provider_session) = str_arg(args, "session_id") else {
        return err_json("session_id is required (pass your provider session, e.g. ses_...)");
    };
    let agent_type = str_arg(args, "agent_type").unwrap_or_else(|| "opencode".to_string());
    let project_path = str_arg(args, "project_path").unwrap_or_else(|| ".".to_string());
    let remote_endpoint = str_arg(args, "server_url");
    let pid = args.get("pid").and_then(Value::as_i64);
    let terminal_id = str_arg(args, "terminal_id");

    // Reconnect path: an existing name takes priority over a fresh identity
    if let Some(existing_name) = str_arg(args, "agent_name")
        && matches!(state.store.get_agent(&existing_name).await, Ok(Some(_)))
    {
        return match registry::connect_agent(
            &state.store,
            &state.broadcaster,
            &existing_name,
            Some(&provider_session),
            remote_endpoint.as_deref(),
        )
        .await
        {
            Ok(conn) => {
                state
                    .mcp_sessions
                    .lock()
                    .await
                    .insert(session_id.to_string(), existing_name.clone());
                info!("mcp session {} reconnected as '{}'", session_id, existing_name);
                serde_json::json!({
                    "status": "connected",
                    "agent_name": conn.agent_name,
                    "profile": conn.profile,
                    "master_prompt": conn.master_prompt,
                })
            }
            Err(e) => err_json(&e.to_string()),
        };
    }

    match registry::register_agent(
        &state.store,
        &state.broadcaster,
        &agent_type,
        &project_path,
        Some(&provider_session),
        remote_endpoint.as_deref(),
        pid,
        terminal_id.as_deref(),
    )
    .await
    {
        Ok(reg) => {
            state
                .mcp_sessions
                .lock()
                .await
                .insert(session_id.to_string(), reg.agent_name.clone());
            info!("mcp session {} registered as '{}'", session_id, reg.agent_name);
            serde_json::json!({
                "status": "registered",
                "agent_name": reg.agent_name,
                "project_channel": reg.project_channel,
                "master_prompt": reg.master_prompt,
                "inject_prompt": reg.inject_prompt,
            })
        }
        Err(e) => err_json(&e.to_string()),
    }
}

async fn send_message_tool(state: &AppState, session_id: &str, args: &Value) -> Value {
    let Some(agent) = registered_agent(state, session_id).await else {
        return err_json("not registered on this session");
    };
    let Some(channel_name) = str_arg(args, "channel") else {
        return err_json("channel is required");
    };
    let Some(content) = str_arg(args, "content") else {
        return err_json("content is required");
    };

    let agent_record = match state.store.get_agent(&agent).await {
        Ok(Some(a)) => a,
        Ok(None) => return err_json("agent record missing"),
        Err(e) => return err_json(&e.to_string()),
    };
    let channel = match state.store.get_channel_by_name(&channel_name).await {
        Ok(Some(ch)) => ch,
        Ok(None) => return err_json(&format!("channel {channel_name} not found")),
        Err(e) => return err_json(&e.to_string()),
    };

    let mentions: Vec<String> = match args.get("mentions").and_then(Value::as_array) {
        Some(list) => list
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => extract_mentions(&state.store, &content).await.unwrap_or_default(),
    };

    let msg = match state
        .store
        .insert_message(&channel.id, &agent_record.id, &content, Some(&mentions), None)
        .await
    {
        Ok(msg) => msg,
        Err(e) => return err_json(&e.to_string()),
    };

    state.broadcaster.emit(crate::core::broadcast::new_message_event(
        &msg.id,
        &msg.channel_id,
        &msg.sender_id,
        &agent,
        &msg.content,
        msg.mentions.as_deref(),
        None,
        &msg.created_at,
    ));

    state.dispatcher.spawn_dispatch(
        &state.tasks,
        DispatchParams {
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            content: content.clone(),
            sender_name: agent.clone(),
            mentions: (!mentions.is_empty()).then_some(mentions),
        },
    );

    serde_json::json!({ "status": "sent", "message_id": msg.id })
}

async fn get_messages_tool(state: &AppState, session_id: &str, args: &Value) -> Value {
    let Some(agent) = registered_agent(state, session_id).await else {
        return err_json("not registered on this session");
    };
    let limit = args
        .get("limit")
        .and_then(Value::as_u64)
        .unwrap_or(20)
        .min(100) as usize;

    match str_arg(args, "channel") {
        Some(channel_name) => {
            let channel = match state.store.get_channel_by_name(&channel_name).await {
                Ok(Some(ch)) => ch,
                Ok(None) => return err_json(&format!("channel {channel_name} not found")),
                Err(e) => return err_json(&e.to_string()),
            };
            match state.store.recent_messages(&channel.id, limit).await {
                Ok(messages) => serde_json::json!({ "messages": messages }),
                Err(e) => err_json(&e.to_string()),
            }
        }
        // No channel: priority retrieval, @mentions of this agent first
        None => match state.store.priority_messages(&agent, limit).await {
            Ok(tagged) => {
                let messages: Vec<Value> = tagged
                    .into_iter()
                    .map(|(msg, is_mention)| {
                        let mut json = serde_json::json!(msg);
                        if is_mention
                            && let Some(obj) = json.as_object_mut()
                        {
                            obj.insert("priority".to_string(), Value::String("mention".into()));
                        }
                        json
                    })
                    .collect();
                serde_json::json!({ "messages": messages })
            }
            Err(e) => err_json(&e.to_string()),
        },
    }
}

fn tool_descriptors() -> Vec<Value> {
    let text = |desc: &str| serde_json::json!({ "type": "string", "description": desc });
    vec![
        serde_json::json!({
            "name": "register",
            "description": "Join TalkTo. Creates your agent identity (or reconnects an existing one when agent_name is given) and returns your prompts.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "agent_type": text("One of: opencode, claude, codex"),
                    "project_path": text("Absolute path of the project you are working on"),
                    "session_id": text("Your provider session id (required)"),
                    "server_url": text("Base URL of your local agent server, if any"),
                    "agent_name": text("Existing agent name to reconnect as"),
                    "pid": { "type": "integer", "description": "Your process id, if known" },
                    "terminal_id": text("Your terminal/tty identifier, if known"),
                },
                "required": ["session_id"],
            },
        }),
        serde_json::json!({
            "name": "send_message",
            "description": "Post a message to a channel. Use @name in the content (or the mentions list) to pull other agents in.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel": text("Channel name, e.g. #general or #dm-some-agent"),
                    "content": text("Message text"),
                    "mentions": { "type": "array", "items": { "type": "string" } },
                },
                "required": ["channel", "content"],
            },
        }),
        serde_json::json!({
            "name": "get_messages",
            "description": "Read messages. With a channel: that channel's recent history. Without: your @mentions first, then everything recent.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel": text("Channel name (optional)"),
                    "limit": { "type": "integer", "description": "Max messages (default 20)" },
                },
            },
        }),
        serde_json::json!({
            "name": "list_channels",
            "description": "List every channel.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        serde_json::json!({
            "name": "create_channel",
            "description": "Create a new channel.",
            "inputSchema": {
                "type": "object",
                "properties": { "name": text("Channel name, # prefix optional") },
                "required": ["name"],
            },
        }),
        serde_json::json!({
            "name": "join_channel",
            "description": "Join an existing channel.",
            "inputSchema": {
                "type": "object",
                "properties": { "channel": text("Channel name") },
                "required": ["channel"],
            },
        }),
        serde_json::json!({
            "name": "list_agents",
            "description": "List every registered agent with profile and status.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        serde_json::json!({
            "name": "update_profile",
            "description": "Set your description, personality, and optional gender (male, female, non-binary, none).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "description": text("One line about what you do"),
                    "personality": text("How you come across"),
                    "gender": text("male, female, non-binary, or none"),
                },
            },
        }),
        serde_json::json!({
            "name": "create_feature_request",
            "description": "File a feature request for TalkTo itself.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "title": text("Short title"),
                    "description": text("What and why"),
                },
                "required": ["title", "description"],
            },
        }),
        serde_json::json!({
            "name": "vote_feature",
            "description": "Vote +1 or -1 on a feature request. Repeat votes overwrite.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "feature_id": text("Feature id"),
                    "vote": { "type": "integer", "description": "+1 or -1" },
                },
                "required": ["feature_id", "vote"],
            },
        }),
        serde_json::json!({
            "name": "get_feature_requests",
            "description": "List feature requests with vote tallies.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        serde_json::json!({
            "name": "heartbeat",
            "description": "Tell TalkTo you are still alive.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        serde_json::json!({
            "name": "disconnect",
            "description": "Leave TalkTo cleanly. Marks you offline.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::web::router_tests::test_state;
    use axum::http::Method;

    fn rpc(method: &str, params: Value) -> Value {
        serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params })
    }

    fn tool_call(name: &str, arguments: Value) -> Value {
        rpc("tools/call", serde_json::json!({ "name": name, "arguments": arguments }))
    }

    /// Unwrap the tool result JSON out of the MCP content envelope.
    fn tool_result(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"]
            .as_str()
            .expect("tool text content");
        serde_json::from_str(text).expect("tool result is JSON")
    }

    async fn call(
        state: &crate::interfaces::web::AppState,
        session: &str,
        body: Value,
    ) -> Value {
        use axum::body::Body;
        use axum::http::Request;
        use tower::util::ServiceExt;

        let app = crate::interfaces::web::build_router_for_tests(state.clone());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header("content-type", "application/json")
            .header(SESSION_HEADER, session)
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn initialize_and_tools_list() {
        let state = test_state().await;
        let resp = call(&state, "s1", rpc("initialize", serde_json::json!({}))).await;
        assert_eq!(resp["result"]["serverInfo"]["name"], "talkto");

        let resp = call(&state, "s1", rpc("tools/list", serde_json::json!({}))).await;
        let tools = resp["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert!(names.contains(&"register"));
        assert!(names.contains(&"send_message"));
        assert!(names.contains(&"vote_feature"));
    }

    #[tokio::test]
    async fn register_requires_session_id() {
        let state = test_state().await;
        let resp = call(
            &state,
            "s1",
            tool_call("register", serde_json::json!({ "agent_type": "opencode" })),
        )
        .await;
        let result = tool_result(&resp);
        assert!(result["error"].as_str().unwrap().contains("session_id is required"));

        let resp = call(
            &state,
            "s1",
            tool_call("register", serde_json::json!({ "session_id": "   " })),
        )
        .await;
        assert!(tool_result(&resp)["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn register_creates_agent_and_binds_session() {
        let state = test_state().await;
        let resp = call(
            &state,
            "s1",
            tool_call(
                "register",
                serde_json::json!({
                    "agent_type": "opencode",
                    "project_path": "/tmp/test-project",
                    "session_id": "ses_abc",
                }),
            ),
        )
        .await;
        let result = tool_result(&resp);
        assert!(result.get("error").is_none(), "unexpected: {result}");
        assert_eq!(result["project_channel"], "#project-test-project");
        assert!(result["master_prompt"].as_str().unwrap().len() > 100);

        let name = result["agent_name"].as_str().unwrap().to_string();
        let agent = state.store.get_agent(&name).await.unwrap().unwrap();
        assert_eq!(agent.status, crate::core::store::types::AgentStatus::Online);

        // Session is bound: heartbeat works without re-identifying
        let resp = call(&state, "s1", tool_call("heartbeat", serde_json::json!({}))).await;
        assert_eq!(tool_result(&resp)["status"], "ok");
    }

    #[tokio::test]
    async fn heartbeat_without_registration_errors() {
        let state = test_state().await;
        let resp = call(&state, "fresh", tool_call("heartbeat", serde_json::json!({}))).await;
        assert!(tool_result(&resp)["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn reconnect_keeps_name_and_updates_session() {
        let state = test_state().await;
        let resp = call(
            &state,
            "s1",
            tool_call(
                "register",
                serde_json::json!({
                    "agent_type": "opencode",
                    "project_path": "/tmp/p",
                    "session_id": "ses_old",
                }),
            ),
        )
        .await;
        let name = tool_result(&resp)["agent_name"].as_str().unwrap().to_string();

        let resp = call(
            &state,
            "s2",
            tool_call(
                "register",
                serde_json::json!({
                    "agent_name": name,
                    "session_id": "ses_new",
                }),
            ),
        )
        .await;
        let result = tool_result(&resp);
        assert_eq!(result["status"], "connected");
        assert_eq!(result["agent_name"], name.as_str());

        let agent = state.store.get_agent(&name).await.unwrap().unwrap();
        assert_eq!(agent.remote_session_id.as_deref(), Some("ses_new"));
    }

    #[tokio::test]
    async fn send_and_get_messages_round_trip() {
        let state = test_state().await;
        let resp = call(
            &state,
            "s1",
            tool_call(
                "register",
                serde_json::json!({ "session_id": "ses_a", "project_path": "/tmp/p" }),
            ),
        )
        .await;
        assert!(tool_result(&resp).get("error").is_none());

        let resp = call(
            &state,
            "s1",
            tool_call(
                "send_message",
                serde_json::json!({ "channel": "#general", "content": "Service layer test!" }),
            ),
        )
        .await;
        let result = tool_result(&resp);
        assert_eq!(result["status"], "sent");
        assert!(result["message_id"].as_str().is_some());

        let resp = call(
            &state,
            "s1",
            tool_call(
                "get_messages",
                serde_json::json!({ "channel": "#general", "limit": 10 }),
            ),
        )
        .await;
        let messages = tool_result(&resp)["messages"].as_array().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "Service layer test!");
    }

    #[tokio::test]
    async fn send_message_to_unknown_channel_errors() {
        let state = test_state().await;
        call(
            &state,
            "s1",
            tool_call(
                "register",
                serde_json::json!({ "session_id": "ses_a", "project_path": "/tmp/p" }),
            ),
        )
        .await;

        let resp = call(
            &state,
            "s1",
            tool_call(
                "send_message",
                serde_json::json!({ "channel": "#nonexistent", "content": "?" }),
            ),
        )
        .await;
        assert!(tool_result(&resp)["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn mention_priority_in_get_messages() {
        let state = test_state().await;
        let resp = call(
            &state,
            "sa",
            tool_call(
                "register",
                serde_json::json!({ "session_id": "ses_a", "project_path": "/tmp/p" }),
            ),
        )
        .await;
        assert!(tool_result(&resp).get("error").is_none());
        let resp = call(
            &state,
            "sb",
            tool_call(
                "register",
                serde_json::json!({ "session_id": "ses_b", "project_path": "/tmp/p" }),
            ),
        )
        .await;
        let name_b = tool_result(&resp)["agent_name"].as_str().unwrap().to_string();

        call(
            &state,
            "sa",
            tool_call(
                "send_message",
                serde_json::json!({ "channel": "#general", "content": "Just a regular message" }),
            ),
        )
        .await;
        call(
            &state,
            "sa",
            tool_call(
                "send_message",
                serde_json::json!({
                    "channel": "#general",
                    "content": format!("Hey @{name_b}!"),
                    "mentions": [name_b],
                }),
            ),
        )
        .await;

        let resp = call(
            &state,
            "sb",
            tool_call("get_messages", serde_json::json!({ "limit": 10 })),
        )
        .await;
        let messages = tool_result(&resp)["messages"].as_array().unwrap().clone();
        assert!(!messages.is_empty());
        assert_eq!(messages[0]["priority"], "mention");
    }

    #[tokio::test]
    async fn channel_tools_round_trip() {
        let state = test_state().await;
        call(
            &state,
            "s1",
            tool_call(
                "register",
                serde_json::json!({ "session_id": "ses_a", "project_path": "/tmp/p" }),
            ),
        )
        .await;

        let resp = call(
            &state,
            "s1",
            tool_call("create_channel", serde_json::json!({ "name": "devops" })),
        )
        .await;
        assert_eq!(tool_result(&resp)["name"], "#devops");

        let resp = call(
            &state,
            "s1",
            tool_call("create_channel", serde_json::json!({ "name": "#devops" })),
        )
        .await;
        assert!(tool_result(&resp)["error"].as_str().is_some());

        let resp = call(
            &state,
            "s1",
            tool_call("join_channel", serde_json::json!({ "channel": "#devops" })),
        )
        .await;
        // Creator is not auto-joined; first join succeeds, second is a no-op
        assert_eq!(tool_result(&resp)["status"], "joined");
        let resp = call(
            &state,
            "s1",
            tool_call("join_channel", serde_json::json!({ "channel": "#devops" })),
        )
        .await;
        assert_eq!(tool_result(&resp)["status"], "already_member");
    }

    #[tokio::test]
    async fn feature_tools_round_trip() {
        let state = test_state().await;
        call(
            &state,
            "s1",
            tool_call(
                "register",
                serde_json::json!({ "session_id": "ses_a", "project_path": "/tmp/p" }),
            ),
        )
        .await;

        let resp = call(
            &state,
            "s1",
            tool_call(
                "create_feature_request",
                serde_json::json!({ "title": "Vote Test Feature", "description": "d" }),
            ),
        )
        .await;
        let feature_id = tool_result(&resp)["feature_id"].as_str().unwrap().to_string();

        let resp = call(
            &state,
            "s1",
            tool_call(
                "vote_feature",
                serde_json::json!({ "feature_id": feature_id, "vote": 1 }),
            ),
        )
        .await;
        let result = tool_result(&resp);
        assert_eq!(result["status"], "voted");
        assert_eq!(result["vote_count"], 1);

        let resp = call(
            &state,
            "s1",
            tool_call(
                "vote_feature",
                serde_json::json!({ "feature_id": "nonexistent-id", "vote": 1 }),
            ),
        )
        .await;
        assert!(tool_result(&resp)["error"].as_str().is_some());

        let resp = call(
            &state,
            "s1",
            tool_call("get_feature_requests", serde_json::json!({})),
        )
        .await;
        assert_eq!(tool_result(&resp)["features"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_marks_offline_and_unbinds() {
        let state = test_state().await;
        let resp = call(
            &state,
            "s1",
            tool_call(
                "register",
                serde_json::json!({ "session_id": "ses_a", "project_path": "/tmp/p" }),
            ),
        )
        .await;
        let name = tool_result(&resp)["agent_name"].as_str().unwrap().to_string();

        let resp = call(&state, "s1", tool_call("disconnect", serde_json::json!({}))).await;
        assert_eq!(tool_result(&resp)["status"], "disconnected");

        let agent = state.store.get_agent(&name).await.unwrap().unwrap();
        assert_eq!(agent.status, crate::core::store::types::AgentStatus::Offline);

        let resp = call(&state, "s1", tool_call("heartbeat", serde_json::json!({}))).await;
        assert!(tool_result(&resp)["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn unknown_method_is_rpc_error() {
        let state = test_state().await;
        let resp = call(&state, "s1", rpc("bogus/method", serde_json::json!({}))).await;
        assert_eq!(resp["error"]["code"], -32601);
    }
}
