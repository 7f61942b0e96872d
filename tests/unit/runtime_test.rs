//! Tests for the runtime adapter and API models

use std::time::Duration;

use sandbox_orchestrator::core::{AdmissionError, Spawn};
use sandbox_orchestrator::runtime::{health, ErrorResponse, PostSandboxRequest, TokioSpawner};
use sandbox_orchestrator::util::TeamId;
use tokio::sync::oneshot;

#[test]
fn test_current_requires_runtime() {
    assert!(TokioSpawner::current().is_err());
}

#[tokio::test]
async fn test_spawner_runs_future() {
    let spawner = TokioSpawner::current().unwrap();
    let (tx, rx) = oneshot::channel();
    spawner.spawn(async move {
        let _ = tx.send(42);
    });
    let value = tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value, 42);
}

#[test]
fn test_request_wire_format() {
    let req: PostSandboxRequest =
        serde_json::from_str(r#"{"templateID": "base", "metadata": {"user": "a"}}"#).unwrap();
    assert_eq!(req.template_id, "base");
    assert_eq!(req.metadata.unwrap()["user"], "a");

    let bare: PostSandboxRequest = serde_json::from_str(r#"{"templateID": "base"}"#).unwrap();
    assert!(bare.metadata.is_none());
}

#[test]
fn test_error_response_from_admission_error() {
    let err = AdmissionError::Forbidden {
        team_id: TeamId::from("T2"),
        template_id: "env-123".into(),
    };
    let body = ErrorResponse::from(&err);
    assert_eq!(body.code, 403);
    assert_eq!(body.message, "You don't have access to this environment");
}

#[test]
fn test_health() {
    assert!(health().ok);
}
