use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::broadcast::Broadcaster;
use crate::core::config::Settings;
use crate::core::invoker::{Dispatcher, NativeTransport};
use crate::core::lifecycle::LifecycleManager;
use crate::core::liveness::NativeProbe;
use crate::core::reconcile::LivenessSweep;
use crate::core::store::Store;
use crate::core::tasks::BackgroundTasks;
use crate::interfaces::web::{ApiServer, ApiServerConfig};

/// Foreground server: wire the context object, start every lifecycle
/// component, and run until Ctrl+C.
pub async fn run_server(settings: Settings) -> Result<()> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(500);
    crate::logging::init(log_tx.clone(), &settings.log_level);

    info!("Starting TalkTo server on {}...", settings.api_base());

    let store = Store::open(&settings.data_dir).await?;
    let broadcaster = Broadcaster::new(256);
    let tasks = BackgroundTasks::new();
    let probe: Arc<dyn crate::core::liveness::ProcessProbe> = Arc::new(NativeProbe);
    let transport: Arc<dyn crate::core::invoker::AgentTransport> =
        Arc::new(NativeTransport::new());
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        probe.clone(),
        transport,
        broadcaster.clone(),
        settings.context_limit,
    ));

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(ApiServerConfig {
        store: store.clone(),
        broadcaster: broadcaster.clone(),
        tasks: tasks.clone(),
        dispatcher,
        probe: probe.clone(),
        log_tx,
        settings: settings.clone(),
    }))));
    lifecycle.attach(Arc::new(Mutex::new(LivenessSweep::new(
        store,
        probe,
        broadcaster,
        Duration::from_secs(settings.liveness_interval_secs),
    ))));

    lifecycle.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    lifecycle.shutdown().await?;
    Ok(())
}
