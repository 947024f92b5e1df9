use std::sync::Arc;

use common::MonitorConfig;

use crate::metrics::{DispatchMetrics, DispatchStats};
use crate::store::MessageStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MessageStore>,
    pub monitor: MonitorConfig,
    pub dispatchers: Vec<Arc<DispatchMetrics>>,
}

impl AppState {
    /// Counters of every dispatcher in this process, summed.
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatchers
            .iter()
            .map(|m| m.snapshot())
            .fold(DispatchStats::default(), DispatchStats::merge)
    }
}
