//! Connection setup and integrity checks for the job database.

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use syncwarden_core::config::StorageConfig;
use syncwarden_core::error::StateError;
use syncwarden_core::types::StoreHealth;
use tracing::{debug, info};

/// Open the job database at `db_path`, creating its directory if needed.
///
/// WAL lets status readers proceed while the supervisor appends log lines;
/// `busy_timeout` covers a second process (e.g. `syncwarden status`) holding
/// the write lock.
pub fn open_job_database(db_path: &Path, storage: &StorageConfig) -> Result<Connection, StateError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path).map_err(StateError::sqlite)?;
    conn.busy_timeout(Duration::from_millis(u64::from(storage.busy_timeout_ms)))
        .map_err(StateError::sqlite)?;
    let journal_mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(StateError::sqlite)?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(StateError::sqlite)?;
    conn.pragma_update(None, "cache_size", storage.cache_size)
        .map_err(StateError::sqlite)?;

    info!(?db_path, %journal_mode, "Job database opened");
    Ok(conn)
}

/// `PRAGMA quick_check` plus a record count. Query failures are reported in
/// the returned health rather than as errors.
pub fn inspect_job_database(conn: &Connection) -> StoreHealth {
    let check: Result<String, _> = conn.query_row("PRAGMA quick_check", [], |row| row.get(0));
    let check = match check {
        Ok(check) => check,
        Err(e) => return StoreHealth::unavailable(e.to_string()),
    };
    let total_jobs = match conn.query_row("SELECT COUNT(*) FROM sync_jobs", [], |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(count) => u64::try_from(count).unwrap_or_default(),
        Err(e) => return StoreHealth::unavailable(e.to_string()),
    };

    if check == "ok" {
        StoreHealth {
            ok: true,
            total_jobs,
            error: None,
        }
    } else {
        debug!(%check, "quick_check reported problems");
        StoreHealth {
            ok: false,
            total_jobs,
            error: Some(check),
        }
    }
}
