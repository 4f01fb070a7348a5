//! Periodic liveness reconciliation: one process-table snapshot per pass,
//! shared across every agent, updating the advisory status cache and
//! broadcasting transitions.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::broadcast::{Broadcaster, agent_status_event};
use crate::core::ghost::compute_ghost;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::liveness::ProcessProbe;
use crate::core::store::Store;
use crate::core::store::types::AgentStatus;

pub struct LivenessSweep {
    store: Store,
    probe: Arc<dyn ProcessProbe>,
    broadcaster: Broadcaster,
    interval: Duration,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LivenessSweep {
    pub fn new(
        store: Store,
        probe: Arc<dyn ProcessProbe>,
        broadcaster: Broadcaster,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            probe,
            broadcaster,
            interval,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }
}

#[async_trait::async_trait]
impl LifecycleComponent for LivenessSweep {
    async fn on_start(&mut self) -> Result<()> {
        let store = self.store.clone();
        let probe = self.probe.clone();
        let broadcaster = self.broadcaster.clone();
        let cancel = self.cancel.clone();
        let period = self.interval;

        info!("Liveness sweep starting (every {:?})", period);
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; skip the initial tick so boot stays quiet
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = sweep_pass(&store, probe.as_ref(), &broadcaster).await {
                            warn!("liveness sweep pass failed: {:#}", e);
                        }
                    }
                }
            }
            debug!("liveness sweep stopped");
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Liveness sweep shut down");
        Ok(())
    }
}

/// One full pass. A failed process-table listing aborts the pass without
/// touching any status (fail open); a failure on one agent never stops the
/// rest.
pub async fn sweep_pass(
    store: &Store,
    probe: &dyn ProcessProbe,
    broadcaster: &Broadcaster,
) -> Result<()> {
    let ps_output = match probe.process_table().await {
        Ok(ps) => ps,
        Err(e) => {
            warn!("process table unavailable, skipping sweep pass: {:#}", e);
            return Ok(());
        }
    };

    let agents = store.list_agents().await?;
    for agent in agents {
        if let Err(e) = reconcile_agent(store, probe, broadcaster, &agent.agent_name, &ps_output).await
        {
            warn!("sweep: reconciling '{}' failed: {:#}", agent.agent_name, e);
        }
    }
    Ok(())
}

async fn reconcile_agent(
    store: &Store,
    probe: &dyn ProcessProbe,
    broadcaster: &Broadcaster,
    agent_name: &str,
    ps_output: &str,
) -> Result<()> {
    let Some(agent) = store.get_agent(agent_name).await? else {
        return Ok(());
    };
    let sessions = store.active_sessions(&agent.id).await?;

    // Sessions whose PID died are retired so they stop counting as backings
    for session in &sessions {
        if !probe.pid_alive(session.pid) {
            debug!(
                "sweep: session {} (pid {}) of '{}' is dead, deactivating",
                session.id, session.pid, agent.agent_name
            );
            store.deactivate_session(&session.id).await?;
        }
    }
    let sessions = store.active_sessions(&agent.id).await?;

    let ghost = compute_ghost(probe, &agent, &sessions, ps_output);
    let desired = if ghost {
        AgentStatus::Offline
    } else {
        AgentStatus::Online
    };

    if store.set_agent_status(&agent.agent_name, desired).await? {
        info!(
            "sweep: '{}' {} -> {}",
            agent.agent_name,
            agent.status.as_str(),
            desired.as_str()
        );
        broadcaster.emit(agent_status_event(
            &agent.agent_name,
            desired.as_str(),
            agent.agent_type.as_str(),
            &agent.project_name,
        ));
    }
    Ok(())
}
