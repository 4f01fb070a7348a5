use serde_derive::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// One event on the realtime stream. Serialized as `{"type": ..., "data": ...}`
/// and fanned out verbatim to every connected WebSocket client.
#[derive(Debug, Clone, Serialize)]
pub struct WsEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl WsEvent {
    pub fn new(event_type: &str, data: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            data,
        }
    }
}

/// Process-wide event sink. Cheap to clone; holding one does not keep the
/// channel alive for receivers that never subscribe.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<WsEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: WsEvent) {
        debug!("broadcast: {}", event.event_type);
        let _ = self.tx.send(event); // Ignored if no receivers
    }

    /// Pass-through for pre-built event payloads (the /_internal endpoint).
    pub fn emit_raw(&self, value: Value) {
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let data = value.get("data").cloned().unwrap_or(Value::Null);
        self.emit(WsEvent { event_type, data });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// --- Event constructors ---

#[allow(clippy::too_many_arguments)]
pub fn new_message_event(
    message_id: &str,
    channel_id: &str,
    sender_id: &str,
    sender_name: &str,
    content: &str,
    mentions: Option<&[String]>,
    parent_id: Option<&str>,
    created_at: &str,
) -> WsEvent {
    WsEvent::new(
        "new_message",
        serde_json::json!({
            "id": message_id,
            "channel_id": channel_id,
            "sender_id": sender_id,
            "sender_name": sender_name,
            "content": content,
            "mentions": mentions.unwrap_or(&[]),
            "parent_id": parent_id,
            "created_at": created_at,
        }),
    )
}

pub fn agent_typing_event(
    agent_name: &str,
    channel_id: &str,
    is_typing: bool,
    error: Option<&str>,
) -> WsEvent {
    let mut data = serde_json::json!({
        "agent_name": agent_name,
        "channel_id": channel_id,
        "is_typing": is_typing,
    });
    if let (Some(err), Some(obj)) = (error, data.as_object_mut()) {
        obj.insert("error".to_string(), Value::String(err.to_string()));
    }
    WsEvent::new("agent_typing", data)
}

pub fn agent_status_event(
    agent_name: &str,
    status: &str,
    agent_type: &str,
    project_name: &str,
) -> WsEvent {
    WsEvent::new(
        "agent_status",
        serde_json::json!({
            "agent_name": agent_name,
            "status": status,
            "agent_type": agent_type,
            "project_name": project_name,
        }),
    )
}

pub fn channel_created_event(
    channel_id: &str,
    channel_name: &str,
    channel_type: &str,
    project_path: Option<&str>,
) -> WsEvent {
    WsEvent::new(
        "channel_created",
        serde_json::json!({
            "id": channel_id,
            "name": channel_name,
            "type": channel_type,
            "project_path": project_path,
        }),
    )
}

pub fn feature_update_event(
    feature_id: &str,
    title: &str,
    status: &str,
    vote_count: i64,
    update_type: &str,
) -> WsEvent {
    WsEvent::new(
        "feature_update",
        serde_json::json!({
            "id": feature_id,
            "title": title,
            "status": status,
            "vote_count": vote_count,
            "update_type": update_type,
        }),
    )
}
