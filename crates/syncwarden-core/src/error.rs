use thiserror::Error;

/// Canonical API-level error codes returned in `{"error": {"code": ...}}` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolErrorCode {
    InvalidInput,
    Unauthorized,
    InternalError,
}

impl ProtocolErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Unauthorized => "unauthorized",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ProtocolErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("sync in progress: job_id={job_id}")]
    SyncInProgress { job_id: i64 },

    #[error("invalid job status in store: {0}")]
    InvalidStatus(String),

    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("schema migration required: current={current}, required={required}")]
    SchemaMigrationRequired { current: u32, required: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StateError {
    /// Convenience constructor for SQLite errors; use with `.map_err(StateError::sqlite)`.
    pub fn sqlite<E: std::fmt::Display>(e: E) -> Self {
        Self::Sqlite(e.to_string())
    }

    pub fn lock_poisoned<E: std::fmt::Display>(e: E) -> Self {
        Self::LockPoisoned(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to start supervisor thread for job {job_id}: {source}")]
    ThreadSpawn {
        job_id: i64,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal process group {pgid}: {reason}")]
    Signal { pgid: u32, reason: String },

    #[error("job manager lock poisoned: {0}")]
    LockPoisoned(String),
}

impl SupervisorError {
    pub fn lock_poisoned<E: std::fmt::Display>(e: E) -> Self {
        Self::LockPoisoned(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_code_strings_match_registry() {
        assert_eq!(ProtocolErrorCode::InvalidInput.as_str(), "invalid_input");
        assert_eq!(ProtocolErrorCode::Unauthorized.as_str(), "unauthorized");
        assert_eq!(ProtocolErrorCode::InternalError.as_str(), "internal_error");
    }

    #[test]
    fn supervisor_error_wraps_state_error_transparently() {
        let err: SupervisorError = StateError::sqlite("disk I/O error").into();
        assert_eq!(err.to_string(), "sqlite error: disk I/O error");
    }
}
