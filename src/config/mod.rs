//! Configuration models for the driver, instance cache and admission flow.

pub mod orchestrator;

pub use orchestrator::{AdmissionSettings, DriverSettings, InstanceCacheSettings, OrchestratorConfig};
