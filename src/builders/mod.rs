//! Builders to construct orchestrator components from configuration.

pub mod orchestrator_builder;

pub use orchestrator_builder::{
    build_driver, build_instance_cache, scheduler_eviction_handler, AdmissionFlowBuilder,
};
