//! Product analytics events emitted by the admission flow.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;

use crate::util::clock::now_ms;
use crate::util::TeamId;

/// Name of the event recorded for every admitted sandbox.
pub const CREATED_INSTANCE: &str = "created_instance";

/// Analytics event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsEvent {
    /// Event identifier.
    pub event_id: String,
    /// Team the event is attributed to.
    pub team_id: TeamId,
    /// Event name, e.g. `created_instance`.
    pub name: String,
    /// Event properties.
    pub properties: BTreeMap<String, String>,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Fire-and-forget analytics sink.
///
/// `record` must not block for long and must not fail the caller.
pub trait AnalyticsSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: AnalyticsEvent);
}

/// In-memory sink for testing and dev. Drops the oldest event when full.
pub struct InMemoryAnalyticsSink {
    events: Mutex<VecDeque<AnalyticsEvent>>,
    max_events: usize,
}

impl InMemoryAnalyticsSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl AnalyticsSink for InMemoryAnalyticsSink {
    fn record(&self, event: AnalyticsEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalyticsSink;

impl AnalyticsSink for TracingAnalyticsSink {
    fn record(&self, event: AnalyticsEvent) {
        tracing::info!(
            team_id = %event.team_id,
            event = %event.name,
            properties = ?event.properties,
            "analytics event"
        );
    }
}

/// Build an analytics event with a fresh ID and the current time.
pub fn build_analytics_event<I, K, V>(team_id: TeamId, name: impl Into<String>, properties: I) -> AnalyticsEvent
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    AnalyticsEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        team_id,
        name: name.into(),
        properties: properties
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
        created_at_ms: now_ms(),
    }
}
