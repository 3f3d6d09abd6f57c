use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a sync job. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(other.to_string()),
        }
    }
}

/// Durable record of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    #[serde(rename = "job_id")]
    pub id: i64,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: JobStatus,
    pub logs: String,
}

impl SyncJob {
    /// Copy of this record whose logs keep only the last `max_chars` characters.
    /// `0` keeps everything.
    pub fn with_log_tail(&self, max_chars: usize) -> Self {
        Self {
            logs: tail_chars(&self.logs, max_chars).to_string(),
            ..self.clone()
        }
    }
}

/// Return the suffix of `text` holding at most `max_chars` characters, cut on a
/// char boundary. `max_chars == 0` returns the whole string.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return text;
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Human-readable direction of the sync, e.g. `dropbox:sessions -> wasabi:archive`.
pub fn sync_direction(source: &str, destination: &str) -> String {
    format!("{source} -> {destination}")
}

/// Integrity of the job database as reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub ok: bool,
    pub total_jobs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreHealth {
    /// Health of a store that could not be inspected at all.
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            total_jobs: 0,
            error: Some(error.into()),
        }
    }
}
