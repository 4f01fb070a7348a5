//! Agent registry service: registration, reconnection, disconnect, heartbeat,
//! and profile updates. Every mutation that changes presence broadcasts an
//! `agent_status` event.

use anyhow::{Result, bail};
use serde_derive::Serialize;
use tracing::info;

use crate::core::broadcast::{Broadcaster, agent_status_event, channel_created_event};
use crate::core::names::{self, CREATOR_NAME};
use crate::core::prompts;
use crate::core::store::{GENERAL_CHANNEL, Store};
use crate::core::store::types::{AgentRecord, AgentStatus, AgentType};

const ALLOWED_GENDERS: &[&str] = &["male", "female", "non-binary", "none"];

#[derive(Debug, Serialize)]
pub struct Registration {
    pub agent_name: String,
    pub status: String,
    pub project_channel: String,
    pub master_prompt: String,
    pub inject_prompt: String,
}

#[derive(Debug, Serialize)]
pub struct Reconnection {
    pub agent_name: String,
    pub status: String,
    pub profile: Option<AgentRecord>,
    pub master_prompt: String,
}

/// Project channel name derived from the filesystem path: last path segment,
/// lowercased, non-alphanumerics collapsed to dashes.
pub fn derive_project_name(project_path: &str) -> String {
    let stem = std::path::Path::new(project_path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("workspace");
    let mut name = String::new();
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }
    let name = name.trim_matches('-').to_string();
    if name.is_empty() { "workspace".to_string() } else { name }
}

/// Create an agent (plus its user row), its project channel, and its default
/// memberships, then hand back the rendered prompts.
pub async fn register_agent(
    store: &Store,
    broadcaster: &Broadcaster,
    agent_type: &str,
    project_path: &str,
    remote_session_id: Option<&str>,
    remote_endpoint: Option<&str>,
    pid: Option<i64>,
    terminal_id: Option<&str>,
) -> Result<Registration> {
    let agent_type = AgentType::parse(agent_type);
    if agent_type == AgentType::System {
        bail!("the system agent cannot be re-registered");
    }

    let project_name = derive_project_name(project_path);

    let mut agent_name = None;
    for attempt in 0..16 {
        let candidate = names::generate_unique_name(&project_name, agent_type.as_str(), attempt);
        if candidate != CREATOR_NAME && store.get_agent(&candidate).await?.is_none() {
            agent_name = Some(candidate);
            break;
        }
    }
    let Some(agent_name) = agent_name else {
        bail!("could not find a free agent name after 16 attempts");
    };

    let user = store
        .create_user(&agent_name, "agent", None, None, None)
        .await?;
    let agent = store
        .create_agent(
            &user.id,
            &agent_name,
            &agent_type,
            project_path,
            &project_name,
            remote_endpoint,
            remote_session_id,
        )
        .await?;

    if let Some(pid) = pid {
        store
            .insert_session(&agent.id, pid, terminal_id.unwrap_or(""))
            .await?;
    }

    // Project channel, created on first registration from this project
    let project_channel = format!("#project-{project_name}");
    let channel = match store.get_channel_by_name(&project_channel).await? {
        Some(ch) => ch,
        None => {
            let ch = store
                .create_channel(&project_channel, "project", Some(project_path), &agent.id)
                .await?;
            broadcaster.emit(channel_created_event(
                &ch.id,
                &ch.name,
                &ch.channel_type,
                ch.project_path.as_deref(),
            ));
            ch
        }
    };
    store.join_channel(&channel.id, &agent.id).await?;
    if let Some(general) = store.get_channel_by_name(GENERAL_CHANNEL).await? {
        store.join_channel(&general.id, &agent.id).await?;
    }

    broadcaster.emit(agent_status_event(
        &agent_name,
        "online",
        agent.agent_type.as_str(),
        &project_name,
    ));
    info!("registered agent '{}' on {}", agent_name, project_channel);

    let operator = store.human_user().await?;
    let master_prompt = prompts::render_master_prompt(
        &agent_name,
        agent.agent_type.as_str(),
        &project_name,
        operator.as_ref(),
    );
    let inject_prompt = prompts::render_inject_prompt(&agent_name, &project_channel);

    Ok(Registration {
        agent_name,
        status: "registered".to_string(),
        project_channel,
        master_prompt,
        inject_prompt,
    })
}

/// Reconnect an existing agent: refresh its session credentials, flip it
/// online, and return the saved profile.
pub async fn connect_agent(
    store: &Store,
    broadcaster: &Broadcaster,
    agent_name: &str,
    remote_session_id: Option<&str>,
    remote_endpoint: Option<&str>,
) -> Result<Reconnection> {
    let Some(agent) = store.get_agent(agent_name).await? else {
        bail!("agent '{}' is not registered", agent_name);
    };

    let session = remote_session_id.filter(|s| !s.trim().is_empty());
    store
        .set_remote_session(agent_name, session, remote_endpoint)
        .await?;
    if store
        .set_agent_status(agent_name, AgentStatus::Online)
        .await?
    {
        broadcaster.emit(agent_status_event(
            agent_name,
            "online",
            agent.agent_type.as_str(),
            &agent.project_name,
        ));
    }

    let operator = store.human_user().await?;
    let master_prompt = prompts::render_master_prompt(
        agent_name,
        agent.agent_type.as_str(),
        &agent.project_name,
        operator.as_ref(),
    );
    let profile = store.get_agent(agent_name).await?;
    info!("agent '{}' reconnected", agent_name);

    Ok(Reconnection {
        agent_name: agent_name.to_string(),
        status: "connected".to_string(),
        profile,
        master_prompt,
    })
}

pub async fn disconnect_agent(
    store: &Store,
    broadcaster: &Broadcaster,
    agent_name: &str,
) -> Result<()> {
    let Some(agent) = store.get_agent(agent_name).await? else {
        bail!("agent '{}' is not registered", agent_name);
    };

    store.deactivate_agent_sessions(&agent.id).await?;
    if store
        .set_agent_status(agent_name, AgentStatus::Offline)
        .await?
    {
        broadcaster.emit(agent_status_event(
            agent_name,
            "offline",
            agent.agent_type.as_str(),
            &agent.project_name,
        ));
    }
    info!("agent '{}' disconnected", agent_name);
    Ok(())
}

pub async fn heartbeat_agent(store: &Store, agent_name: &str) -> Result<()> {
    let Some(agent) = store.get_agent(agent_name).await? else {
        bail!("agent '{}' is not registered", agent_name);
    };
    store.touch_sessions(&agent.id).await?;
    Ok(())
}

pub async fn update_agent_profile(
    store: &Store,
    agent_name: &str,
    description: Option<&str>,
    personality: Option<&str>,
    gender: Option<&str>,
) -> Result<AgentRecord> {
    if let Some(g) = gender
        && !ALLOWED_GENDERS.contains(&g)
    {
        bail!(
            "gender must be one of {:?}, got '{}'",
            ALLOWED_GENDERS,
            g
        );
    }

    match store
        .update_agent_profile(agent_name, description, personality, gender)
        .await?
    {
        Some(agent) => Ok(agent),
        None => bail!("agent '{}' is not registered", agent_name),
    }
}
