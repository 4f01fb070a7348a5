//! Ghost detection: is there any currently-reachable process behind a
//! registered agent?

use anyhow::Result;

use crate::core::liveness::{ProcessProbe, session_alive, session_in_ps};
use crate::core::store::Store;
use crate::core::store::types::{AgentRecord, AgentType, SessionRecord};

/// Every way an agent record can claim a backing, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessBacking {
    /// Built-in agent with no process to check. Always live.
    System,
    /// Reachable through a provider session visible in the process table.
    RemoteSession(String),
    /// Reachable through a locally observed PID.
    LocalProcess(i64),
}

/// Resolve the candidate backings for one agent, strongest claim first.
/// An empty list means the agent is unbacked and therefore a ghost.
pub fn candidate_backings(
    agent: &AgentRecord,
    active_sessions: &[SessionRecord],
) -> Vec<LivenessBacking> {
    if agent.agent_type == AgentType::System {
        return vec![LivenessBacking::System];
    }

    let mut backings = Vec::new();
    if let Some(token) = agent.remote_session_id.as_deref()
        && !token.trim().is_empty()
    {
        backings.push(LivenessBacking::RemoteSession(token.to_string()));
    }
    for session in active_sessions {
        backings.push(LivenessBacking::LocalProcess(session.pid));
    }
    backings
}

/// `true` means no currently-reachable process backs this agent. Unknown
/// agents return `false` — existence validation is the caller's job and this
/// check fails toward "don't block".
pub async fn is_agent_ghost(
    store: &Store,
    probe: &dyn ProcessProbe,
    agent_name: &str,
) -> Result<bool> {
    let Some(agent) = store.get_agent(agent_name).await? else {
        return Ok(false);
    };
    let sessions = store.active_sessions(&agent.id).await?;

    for backing in candidate_backings(&agent, &sessions) {
        let live = match &backing {
            LivenessBacking::System => true,
            LivenessBacking::RemoteSession(token) => session_alive(probe, token).await,
            LivenessBacking::LocalProcess(pid) => probe.pid_alive(*pid),
        };
        if live {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Batch form for the reconciliation sweep: the caller lists the process
/// table once and shares the snapshot across every agent in the pass.
pub fn compute_ghost(
    probe: &dyn ProcessProbe,
    agent: &AgentRecord,
    active_sessions: &[SessionRecord],
    ps_output: &str,
) -> bool {
    for backing in candidate_backings(agent, active_sessions) {
        let live = match &backing {
            LivenessBacking::System => true,
            LivenessBacking::RemoteSession(token) => session_in_ps(token, ps_output),
            LivenessBacking::LocalProcess(pid) => probe.pid_alive(*pid),
        };
        if live {
            return false;
        }
    }
    true
}
