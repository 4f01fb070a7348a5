use serde_derive::{Deserialize, Serialize};

/// Which runtime backs an agent. `System` agents (the built-in creator) have
/// no process behind them at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    System,
    Opencode,
    Claude,
    Codex,
    #[serde(untagged)]
    Custom(String),
}

impl AgentType {
    pub fn as_str(&self) -> &str {
        match self {
            AgentType::System => "system",
            AgentType::Opencode => "opencode",
            AgentType::Claude => "claude",
            AgentType::Codex => "codex",
            AgentType::Custom(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "system" => AgentType::System,
            "opencode" => AgentType::Opencode,
            "claude" => AgentType::Claude,
            "codex" => AgentType::Codex,
            other => AgentType::Custom(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "online" {
            AgentStatus::Online
        } else {
            AgentStatus::Offline
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub user_type: String, // "human" or "agent"
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub agent_instructions: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    pub id: String,
    pub agent_name: String,
    pub agent_type: AgentType,
    pub project_path: String,
    pub project_name: String,
    /// Advisory cache only — ground truth is the liveness probe.
    pub status: AgentStatus,
    pub remote_endpoint: Option<String>,
    pub remote_session_id: Option<String>,
    pub description: Option<String>,
    pub personality: Option<String>,
    pub gender: Option<String>,
}

/// One observed local process for an agent. Multiple rows may exist; only one
/// is normally active.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub agent_id: String,
    pub pid: i64,
    pub terminal_id: String,
    pub is_active: bool,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub last_heartbeat: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub channel_type: String, // "general", "project", "custom", "dm"
    pub project_path: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub mentions: Option<Vec<String>>,
    pub parent_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub created_by: String,
    pub created_at: String,
    pub vote_count: i64,
}
