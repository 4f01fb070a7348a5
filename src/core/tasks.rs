use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Tracks fire-and-forget work so in-flight units are observable and nothing
/// is lost silently. Owned by the app context and injected — not a module
/// global. Units swallow-and-log their own errors; the registry only tracks
/// lifetime.
#[derive(Clone)]
pub struct BackgroundTasks {
    live: Arc<Mutex<HashSet<u64>>>,
    next_id: Arc<AtomicU64>,
}

pub struct TaskHandle {
    pub id: u64,
    pub join: tokio::task::JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            live: Arc::new(Mutex::new(HashSet::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Spawn a unit and track it until it completes (success or failure).
    /// The id is inserted before the task starts so a unit can never finish
    /// before it is tracked.
    pub fn spawn<F>(&self, fut: F) -> TaskHandle
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live
            .lock()
            .expect("task registry lock poisoned")
            .insert(id);

        let live = self.live.clone();
        let join = tokio::spawn(async move {
            fut.await;
            live.lock().expect("task registry lock poisoned").remove(&id);
        });

        TaskHandle { id, join }
    }

    pub fn is_tracked(&self, id: u64) -> bool {
        self.live
            .lock()
            .expect("task registry lock poisoned")
            .contains(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().expect("task registry lock poisoned").len()
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}
