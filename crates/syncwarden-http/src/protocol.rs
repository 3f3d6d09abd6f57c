//! JSON payloads of the control API.

use serde::{Deserialize, Serialize};
use syncwarden_core::error::ProtocolErrorCode;
use syncwarden_core::types::StoreHealth;
use syncwarden_supervisor::{CancelOutcome, ClearOutcome, StartOutcome};

/// Optional body of `POST /sync`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Per-invocation credential handed to the executor's environment.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub direction: String,
    pub active_job_id: Option<i64>,
    pub store: StoreHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: String,
    pub job_id: i64,
    pub message: String,
}

impl StartResponse {
    pub fn from_outcome(outcome: &StartOutcome, direction: &str) -> Self {
        match outcome {
            StartOutcome::Started { job_id } => Self {
                status: "started".into(),
                job_id: *job_id,
                message: format!("Sync started ({direction})"),
            },
            StartOutcome::Ignored { job_id } => Self {
                status: "ignored".into(),
                job_id: *job_id,
                message: format!("Job {job_id} is already running."),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CancelResponse {
    pub fn from_outcome(outcome: &CancelOutcome) -> Self {
        match outcome {
            CancelOutcome::Success { job_id } => Self {
                status: "success".into(),
                job_id: Some(*job_id),
                message: Some(format!("Cancellation requested for job {job_id}.")),
            },
            CancelOutcome::Ignored => Self {
                status: "ignored".into(),
                job_id: None,
                message: Some("No sync job is running.".into()),
            },
            CancelOutcome::Error { reason } => Self {
                status: "error".into(),
                job_id: None,
                message: Some(reason.clone()),
            },
        }
    }
}

/// `GET /status` body when no job has ever run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleResponse {
    pub status: String,
    pub logs: String,
}

impl Default for IdleResponse {
    fn default() -> Self {
        Self {
            status: "IDLE".into(),
            logs: "No jobs run yet.".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClearResponse {
    pub fn from_outcome(outcome: &ClearOutcome) -> Self {
        match outcome {
            ClearOutcome::Cleared { deleted } => Self {
                status: "cleared".into(),
                deleted: Some(*deleted),
                job_id: None,
                message: None,
            },
            ClearOutcome::Ignored { job_id } => Self {
                status: "ignored".into(),
                deleted: None,
                job_id: Some(*job_id),
                message: Some(format!(
                    "Job {job_id} is running; history can be cleared once it finishes."
                )),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// `{"error": {"code", "message"}}` envelope for rejected requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

impl ErrorResponse {
    pub fn new(code: ProtocolErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.as_str().to_string(),
                message: message.into(),
            },
        }
    }
}
