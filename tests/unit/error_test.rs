//! Tests for error types

use std::error::Error;

use sandbox_orchestrator::core::{
    AdmissionError, CacheError, CompensationOutcome, DriverError, ReleaseError, TenantStoreError,
    UpstreamError,
};
use sandbox_orchestrator::util::{SandboxId, TaskId, TeamId};

#[test]
fn test_already_started_error() {
    let err = DriverError::AlreadyStarted(TaskId::from("task-1"));
    assert_eq!(format!("{}", err), "task with ID \"task-1\" already started");
}

#[test]
fn test_release_error_is_transparent() {
    let err = DriverError::from(ReleaseError::new("cloud storage client", "connection reset"));
    assert_eq!(
        format!("{}", err),
        "error closing cloud storage client: connection reset"
    );
    assert!(err.source().is_some());
}

#[test]
fn test_cache_errors() {
    let exists = CacheError::AlreadyExists(SandboxId::from("sbx-1"));
    assert_eq!(format!("{}", exists), "instance \"sbx-1\" already exists");
    let missing = CacheError::NotFound(SandboxId::from("sbx-2"));
    assert_eq!(format!("{}", missing), "instance \"sbx-2\" not found");
}

#[test]
fn test_upstream_client_error_range() {
    assert!(UpstreamError::new(404, "not found", "").is_client_error());
    assert!(!UpstreamError::new(503, "unavailable", "").is_client_error());
    assert!(!UpstreamError::new(302, "moved", "").is_client_error());
}

#[test]
fn test_admission_status_codes() {
    let team_id = TeamId::from("T1");
    let cases = [
        (
            AdmissionError::InvalidTemplate {
                template_id: "a/b".into(),
                reason: "invalid character".into(),
            },
            400,
        ),
        (
            AdmissionError::AccessCheck(TenantStoreError("timeout".into())),
            500,
        ),
        (
            AdmissionError::Forbidden {
                team_id: team_id.clone(),
                template_id: "env-1".into(),
            },
            403,
        ),
        (
            AdmissionError::CapacityExceeded {
                team_id: team_id.clone(),
                limit: 20,
            },
            403,
        ),
        (
            AdmissionError::Upstream(UpstreamError::new(429, "slow down", "rate limited")),
            429,
        ),
        (
            AdmissionError::Registration {
                source: CacheError::AlreadyExists(SandboxId::from("sbx-1")),
                compensation: CompensationOutcome::RolledBack,
            },
            500,
        ),
    ];
    for (err, status) in cases {
        assert_eq!(err.status_code(), status, "{err}");
    }
}

#[test]
fn test_capacity_message_names_limit() {
    let err = AdmissionError::CapacityExceeded {
        team_id: TeamId::from("T1"),
        limit: 20,
    };
    assert_eq!(
        err.client_message(),
        "You have reached the maximum number of concurrent sandboxes (20). \
         If you need more, please contact support"
    );
}

#[test]
fn test_registration_error_carries_both_failures() {
    let err = AdmissionError::Registration {
        source: CacheError::AlreadyExists(SandboxId::from("sbx-1")),
        compensation: CompensationOutcome::Leaked(UpstreamError::new(500, "internal", "timeout")),
    };
    let text = err.to_string();
    assert!(text.contains("already exists"));
    assert!(text.contains("rollback failed"));
    assert!(!err.is_client_error());
}
