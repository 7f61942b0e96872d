//! # Sandbox Orchestrator
//!
//! Task lifecycle and admission control for short-lived sandbox workloads running on a
//! cluster job scheduler.
//!
//! The crate sits between an API surface and a cluster scheduler. It tracks every
//! managed job as a cancellable handle, exposes the start/wait/stop/destroy/stats
//! protocol a scheduler plugin framework drives concurrently, and admits new sandboxes
//! against per-team concurrency ceilings with a compensating rollback when registration
//! fails after the scheduler already created the sandbox.
//!
//! ## Key Features
//!
//! - **Task handles**: `Running -> Exited -> Destroyed` state machine, a cancellable scope
//!   derived from the driver scope, and a completion signal fired exactly once
//! - **Task store**: sharded registry keyed by job ID, insert-if-absent registration
//! - **Driver facade**: one generic [`core::Driver`] shared by every [`core::JobKind`]
//!   (template deletion, template build)
//! - **Instance cache**: sharded registry of live sandboxes with a per-team index,
//!   expiry sweeping and eviction hooks
//! - **Admission flow**: access check, capacity check, scheduler create, cache
//!   registration, best-effort compensation
//!
//! ## Driving a job
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sandbox_orchestrator::core::{Driver, TaskConfig};
//! use sandbox_orchestrator::core::jobs::TemplateDelete;
//! use sandbox_orchestrator::runtime::TokioSpawner;
//! use sandbox_orchestrator::util::TracingTelemetry;
//! use tokio_util::sync::CancellationToken;
//!
//! let driver = Driver::new(
//!     TemplateDelete::new(storage_factory, artifact_registry),
//!     TokioSpawner::current()?,
//!     CancellationToken::new(),
//!     Arc::new(TracingTelemetry),
//! );
//! let config = TaskConfig::new("task-1")
//!     .with_env("BUCKET_NAME", "templates")
//!     .with_driver_config(serde_json::json!({
//!         "TemplateID": "env-123", "SpanID": "", "TraceID": ""
//!     }));
//! let (handle, _network) = driver.start_task(config).await?;
//! let exit = driver.wait_task("task-1", CancellationToken::new())?.await?;
//! driver.destroy_task("task-1", false)?;
//! ```
//!
//! ## Admitting a sandbox
//!
//! ```rust,ignore
//! use sandbox_orchestrator::builders::AdmissionFlowBuilder;
//! use sandbox_orchestrator::core::SandboxRequest;
//!
//! let flow = AdmissionFlowBuilder::from_config(&cfg, TokioSpawner::current()?)
//!     .tenant_store(tenants)
//!     .scheduler(scheduler)
//!     .instance_cache(cache)
//!     .usage_tracker(usage)
//!     .build()?;
//! let sandbox = flow.admit(&team, SandboxRequest {
//!     template_id: "env-123".into(),
//!     metadata: Default::default(),
//! }).await?;
//! ```
//!
//! For complete examples, see:
//! - `tests/driver_lifecycle_test.rs` - driver protocol end to end
//! - `tests/admission_test.rs` - capacity, overrun bound and rollback

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task lifecycle, registries and admission control.
pub mod core;
/// Configuration models for the driver, instance cache and admission flow.
pub mod config;
/// Builders to construct orchestrator components from configuration.
pub mod builders;
/// In-memory adapters for the orchestrator's collaborators.
pub mod infra;
/// Runtime adapter and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
