//! API-facing request/response models for sandbox creation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{AdmissionError, AdmissionFlow, SandboxRequest, Spawn, Team};
use crate::util::SandboxId;

/// Body of `POST /sandboxes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSandboxRequest {
    /// Template ID or alias.
    #[serde(rename = "templateID")]
    pub template_id: String,
    /// Metadata attached to the sandbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Created sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxResponse {
    /// Resolved template.
    #[serde(rename = "templateID")]
    pub template_id: String,
    /// Sandbox identity.
    #[serde(rename = "sandboxID")]
    pub sandbox_id: SandboxId,
    /// First alias registered for the template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Node the sandbox runs on.
    #[serde(rename = "clientID")]
    pub client_id: String,
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status.
    pub code: u16,
    /// Client-facing message.
    pub message: String,
}

impl From<&AdmissionError> for ErrorResponse {
    fn from(err: &AdmissionError) -> Self {
        Self {
            code: err.status_code(),
            message: err.client_message(),
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Handle `POST /sandboxes` for an authenticated team.
pub async fn post_sandboxes<S: Spawn>(
    flow: &AdmissionFlow<S>,
    team: &Team,
    req: PostSandboxRequest,
) -> Result<SandboxResponse, ErrorResponse> {
    let request = SandboxRequest {
        template_id: req.template_id,
        metadata: req.metadata.unwrap_or_default(),
    };
    match flow.admit(team, request).await {
        Ok(sandbox) => Ok(SandboxResponse {
            template_id: sandbox.template_id,
            sandbox_id: sandbox.sandbox_id,
            alias: sandbox.alias,
            client_id: sandbox.client_id,
        }),
        Err(err) => {
            tracing::warn!(team_id = %team.id, status = err.status_code(), error = %err, "sandbox admission rejected");
            Err(ErrorResponse::from(&err))
        }
    }
}

/// Return a health payload.
#[must_use]
pub const fn health() -> Health {
    Health { ok: true }
}
