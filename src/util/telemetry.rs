//! Telemetry helpers for structured logging and tracing.

use std::fmt;

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber if none is set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A key/value attribute attached to the current operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute key, e.g. `env.team.id`.
    pub key: &'static str,
    /// Attribute value.
    pub value: String,
}

impl Attribute {
    /// Build an attribute from anything displayable.
    pub fn new(key: &'static str, value: impl fmt::Display) -> Self {
        Self {
            key,
            value: value.to_string(),
        }
    }
}

/// Observational telemetry sink.
///
/// Implementations must never block or fail the caller; every method is
/// fire-and-forget.
pub trait Telemetry: Send + Sync {
    /// Report a recoverable error.
    fn report_error(&self, err: &dyn std::error::Error);
    /// Report an error that failed the current operation.
    fn report_critical_error(&self, err: &dyn std::error::Error);
    /// Record a named milestone.
    fn report_event(&self, name: &str);
    /// Attach attributes to the current operation.
    fn set_attributes(&self, attrs: &[Attribute]);
}

/// [`Telemetry`] backed by `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn report_error(&self, err: &dyn std::error::Error) {
        tracing::warn!(error = %err, "reported error");
    }

    fn report_critical_error(&self, err: &dyn std::error::Error) {
        tracing::error!(error = %err, "reported critical error");
    }

    fn report_event(&self, name: &str) {
        tracing::info!(event = name, "telemetry event");
    }

    fn set_attributes(&self, attrs: &[Attribute]) {
        for attr in attrs {
            tracing::debug!(key = attr.key, value = %attr.value, "attribute");
        }
    }
}
