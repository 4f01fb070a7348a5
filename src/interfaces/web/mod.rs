mod handlers;
mod router;
mod ws;

#[cfg(test)]
pub(crate) use router::tests as router_tests;

#[cfg(test)]
pub(crate) fn build_router_for_tests(state: AppState) -> axum::Router {
    router::build_api_router(state)
}

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::core::broadcast::Broadcaster;
use crate::core::config::Settings;
use crate::core::invoker::Dispatcher;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::liveness::ProcessProbe;
use crate::core::store::Store;
use crate::core::tasks::BackgroundTasks;

/// Maps an MCP session id to the agent name registered on it.
pub(crate) type McpSessions = Arc<tokio::sync::Mutex<HashMap<String, String>>>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Store,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) tasks: BackgroundTasks,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) probe: Arc<dyn ProcessProbe>,
    pub(crate) mcp_sessions: McpSessions,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) context_limit: usize,
    pub(crate) api_port: u16,
}

pub struct ApiServerConfig {
    pub store: Store,
    pub broadcaster: Broadcaster,
    pub tasks: BackgroundTasks,
    pub dispatcher: Arc<Dispatcher>,
    pub probe: Arc<dyn ProcessProbe>,
    pub log_tx: tokio::sync::broadcast::Sender<String>,
    pub settings: Settings,
}

pub struct ApiServer {
    config: ApiServerConfig,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let state = AppState {
            store: self.config.store.clone(),
            broadcaster: self.config.broadcaster.clone(),
            tasks: self.config.tasks.clone(),
            dispatcher: self.config.dispatcher.clone(),
            probe: self.config.probe.clone(),
            mcp_sessions: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            log_tx: self.config.log_tx.clone(),
            context_limit: self.config.settings.context_limit,
            api_port: self.config.settings.port,
        };
        let addr = format!("{}:{}", self.config.settings.host, self.config.settings.port);

        tokio::spawn(async move {
            let app = router::build_api_router(state);
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    info!("TalkTo API running at http://{addr}");
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::error!("API server crashed: {}", e);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to bind {}: {}", addr, e);
                }
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server shutting down...");
        Ok(())
    }
}

// --- SSE log tail (used by router) ---

pub(crate) async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| {
        match msg {
            Ok(log) => Ok(Event::default().data(log)), // SSE properly encodes this
            Err(_) => Ok(Event::default().data("Log stream lagged")),
        }
    });

    Sse::new(stream)
}
