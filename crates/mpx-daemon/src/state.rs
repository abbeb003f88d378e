//! Shared daemon state.
//!
//! One [`Workflow`] serves every request. Its notifier is a
//! [`NotificationDispatcher`] whose sink is a [`BroadcastSink`]; the SSE
//! route subscribes to that sink.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use mpx_notify::{BroadcastSink, DispatchStats, NotificationDispatcher};
use mpx_store::{EntityStore, MemoryStore};
use mpx_workflow::{RetryPolicy, Workflow};

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "mpx-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

pub struct AppState {
    pub workflow: Workflow,
    pub events: BroadcastSink,
    pub dispatch: Arc<DispatchStats>,
    pub build: BuildInfo,
}

impl AppState {
    /// Wire a workflow over `store`. Spawns the notification worker, so this
    /// must run inside a Tokio runtime.
    pub fn new(store: Arc<dyn EntityStore>, retry: RetryPolicy, queue_capacity: usize) -> Self {
        let events = BroadcastSink::new(queue_capacity);
        let (dispatcher, _worker) =
            NotificationDispatcher::spawn(Arc::new(events.clone()), queue_capacity);
        let dispatch = dispatcher.stats();
        Self {
            workflow: Workflow::new(store, Arc::new(dispatcher), retry),
            events,
            dispatch,
            build: BuildInfo::default(),
        }
    }

    /// In-memory store with default retry policy and queue size.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), RetryPolicy::default(), 1024)
    }
}

static START: OnceLock<Instant> = OnceLock::new();

pub fn uptime_secs() -> u64 {
    START.get_or_init(Instant::now).elapsed().as_secs()
}
