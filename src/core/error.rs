//! Error types for driver, cache and admission operations.

use std::fmt;

use thiserror::Error;

use crate::util::{SandboxId, TaskId, TeamId};

/// Boxed error used where a collaborator's concrete error type is opaque.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the driver lifecycle operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The job ID is not tracked by the task store.
    #[error("task not found")]
    TaskNotFound,
    /// A job with this ID is already tracked.
    #[error("task with ID \"{0}\" already started")]
    AlreadyStarted(TaskId),
    /// Destroy without `force` on a job that has not exited.
    #[error("task is still running")]
    StillRunning,
    /// The job's declared configuration could not be decoded.
    #[error("failed to decode driver config: {0}")]
    DecodeConfig(#[source] serde_json::Error),
    /// The decoded configuration failed validation.
    #[error("invalid driver config: {0}")]
    InvalidConfig(String),
    /// Building the job payload failed (e.g. opening a storage client).
    #[error("failed to prepare task: {0}")]
    Prepare(#[source] BoxError),
    /// The restart-safe snapshot could not be encoded or decoded.
    #[error("failed to set driver state: {0}")]
    DriverState(#[source] serde_json::Error),
    /// Releasing payload-owned resources failed during destroy.
    #[error(transparent)]
    Release(#[from] ReleaseError),
}

/// A payload-owned resource failed to close.
#[derive(Debug, Error)]
#[error("error closing {resource}: {source}")]
pub struct ReleaseError {
    /// Human readable name of the resource, e.g. `cloud storage client`.
    pub resource: &'static str,
    /// Underlying failure.
    #[source]
    pub source: BoxError,
}

impl ReleaseError {
    /// Wrap a close failure for `resource`.
    pub fn new(resource: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            resource,
            source: source.into(),
        }
    }
}

/// Errors produced by the instance cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// An instance with the same sandbox ID is already cached.
    #[error("instance \"{0}\" already exists")]
    AlreadyExists(SandboxId),
    /// No instance with this sandbox ID is cached.
    #[error("instance \"{0}\" not found")]
    NotFound(SandboxId),
}

/// Failure reported by the cluster scheduler client.
#[derive(Debug, Clone, Error)]
#[error("scheduler returned {status}: {detail}")]
pub struct UpstreamError {
    /// HTTP status the failure maps to.
    pub status: u16,
    /// Message that is safe to show to the client.
    pub client_msg: String,
    /// Internal detail for logs.
    pub detail: String,
}

impl UpstreamError {
    /// Build an upstream failure.
    pub fn new(status: u16, client_msg: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            client_msg: client_msg.into(),
            detail: detail.into(),
        }
    }

    /// Whether the caller caused the failure (4xx).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }
}

/// Failure reported by the tenant/authorization store.
#[derive(Debug, Clone, Error)]
#[error("tenant store error: {0}")]
pub struct TenantStoreError(pub String);

/// Outcome of the compensating delete issued after a registration failure.
#[derive(Debug)]
pub enum CompensationOutcome {
    /// The just-created scheduler job was deleted.
    RolledBack,
    /// The delete failed; the scheduler job may still be alive.
    Leaked(UpstreamError),
}

impl CompensationOutcome {
    /// Whether the compensating delete succeeded.
    #[must_use]
    pub const fn rolled_back(&self) -> bool {
        matches!(self, Self::RolledBack)
    }
}

impl fmt::Display for CompensationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RolledBack => f.write_str("instance rolled back"),
            Self::Leaked(err) => write!(f, "rollback failed, instance leaked: {err}"),
        }
    }
}

/// Errors produced by the sandbox admission flow.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The requested template ID or alias is malformed.
    #[error("invalid template ID \"{template_id}\": {reason}")]
    InvalidTemplate {
        /// Raw template ID as requested.
        template_id: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The authorization lookup itself failed.
    #[error("error when checking team access: {0}")]
    AccessCheck(#[source] TenantStoreError),
    /// The team may not use the template.
    #[error("team \"{team_id}\" doesn't have access to env \"{template_id}\"")]
    Forbidden {
        /// Requesting team.
        team_id: TeamId,
        /// Resolved template.
        template_id: String,
    },
    /// The team is at or above its concurrency ceiling.
    #[error("team \"{team_id}\" has reached the maximum number of instances ({limit})")]
    CapacityExceeded {
        /// Requesting team.
        team_id: TeamId,
        /// The team's ceiling.
        limit: u32,
    },
    /// The scheduler failed to create the sandbox.
    #[error("error when creating instance: {0}")]
    Upstream(#[source] UpstreamError),
    /// The sandbox was created but could not be registered in the cache.
    #[error("error when adding instance to cache: {source} ({compensation})")]
    Registration {
        /// Cache failure.
        #[source]
        source: CacheError,
        /// Result of the compensating delete.
        compensation: CompensationOutcome,
    },
}

impl AdmissionError {
    /// HTTP status a client should receive.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidTemplate { .. } => 400,
            Self::Forbidden { .. } | Self::CapacityExceeded { .. } => 403,
            Self::Upstream(err) => err.status,
            Self::AccessCheck(_) | Self::Registration { .. } => 500,
        }
    }

    /// Whether the client caused the rejection and should not retry unchanged.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        let status = self.status_code();
        status >= 400 && status < 500
    }

    /// Message that is safe to return to the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidTemplate { reason, .. } => format!("Invalid environment ID: {reason}"),
            Self::AccessCheck(err) => format!("Error when checking team access: {err}"),
            Self::Forbidden { .. } => "You don't have access to this environment".to_owned(),
            Self::CapacityExceeded { limit, .. } => format!(
                "You have reached the maximum number of concurrent sandboxes ({limit}). \
                 If you need more, please contact support"
            ),
            Self::Upstream(err) => err.client_msg.clone(),
            Self::Registration { .. } => "Cannot create a sandbox right now".to_owned(),
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
