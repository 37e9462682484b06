//! Views of the award explorer: the top-level entity table, the per-drill
//! tabs, and the session tying them to the navigation stack

mod browser;
mod session;
mod tabs;

pub use browser::{BrowserQuery, BrowserView, EntityBrowser};
pub use session::DrillSession;
pub use tabs::{TabBoard, TabOrchestrator, TabSettings};

use std::sync::Arc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use ax_core::events::EventBus;
use ax_data::PagedFetcher;

/// Shared handles passed to every view
#[derive(Clone)]
pub struct ViewerContext {
    /// Runs every query the views launch
    pub fetcher: PagedFetcher,

    /// Tokio runtime handle
    pub runtime_handle: tokio::runtime::Handle,

    /// Progress notifications
    pub events: Arc<EventBus>,
}

impl ViewerContext {
    pub fn new(fetcher: PagedFetcher, runtime_handle: tokio::runtime::Handle) -> Self {
        Self {
            fetcher,
            runtime_handle,
            events: Arc::new(EventBus::new()),
        }
    }
}

/// Background loads a view has launched and not yet awaited
#[derive(Default)]
pub(crate) struct InFlight {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl InFlight {
    pub(crate) fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Wait until every tracked load, including ones started meanwhile, is done
    pub(crate) async fn wait(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(e) = task.await {
                    if e.is_panic() {
                        tracing::error!("View load task panicked: {}", e);
                    }
                }
            }
        }
    }
}
