//! Resource-usage samples emitted by the stats feed.

use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// One resource-usage sample for a running job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskResourceUsage {
    /// Sample time, milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
    /// CPU usage in percent of one core.
    pub cpu_percent: f64,
    /// Resident memory in bytes.
    pub memory_rss_bytes: u64,
}

impl TaskResourceUsage {
    /// An all-zero sample stamped with the current time.
    ///
    /// Orchestration jobs run out of process, so this is what most payloads report.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            timestamp_ms: now_ms(),
            cpu_percent: 0.0,
            memory_rss_bytes: 0,
        }
    }
}
