//! Shared, thread-safe access to the job table.
//!
//! The request path and the supervisor thread both write through one
//! `JobStore`; a single connection behind a mutex serializes every statement,
//! so each append and each status transition is atomic per record.

use crate::{db, jobs, schema};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use syncwarden_core::config::StorageConfig;
use syncwarden_core::error::StateError;
use syncwarden_core::time::{now_iso8601, stamp_log_line};
use syncwarden_core::types::{JobStatus, StoreHealth, SyncJob};

pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    /// Open (creating if needed) the job database and apply migrations.
    pub fn open(db_path: &Path, storage: &StorageConfig) -> Result<Self, StateError> {
        let conn = db::open_job_database(db_path, storage)?;
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let conn = self.conn.lock().map_err(StateError::lock_poisoned)?;
        f(&conn)
    }

    /// Create a `RUNNING` record whose logs start with the stamped `banner`.
    pub fn insert_running(&self, banner: &str) -> Result<i64, StateError> {
        let start_time = now_iso8601();
        let entry = stamp_log_line(banner);
        self.with_conn(|conn| jobs::create_running_job(conn, &start_time, &entry))
    }

    /// Append one output line (timestamped here) to a running job.
    pub fn append_log(&self, job_id: i64, line: &str) -> Result<bool, StateError> {
        let entry = stamp_log_line(line);
        self.with_conn(|conn| jobs::append_log(conn, job_id, &entry))
    }

    /// Terminal transition: status, `end_time`, and trailing line in one write.
    pub fn finish(
        &self,
        job_id: i64,
        status: JobStatus,
        trailing_line: &str,
    ) -> Result<bool, StateError> {
        let end_time = now_iso8601();
        let entry = stamp_log_line(trailing_line);
        self.with_conn(|conn| jobs::finish_job(conn, job_id, status, &end_time, &entry))
    }

    pub fn get(&self, job_id: i64) -> Result<Option<SyncJob>, StateError> {
        self.with_conn(|conn| jobs::get_job(conn, job_id))
    }

    pub fn latest(&self) -> Result<Option<SyncJob>, StateError> {
        self.with_conn(jobs::get_latest_job)
    }

    pub fn running(&self) -> Result<Option<SyncJob>, StateError> {
        self.with_conn(jobs::get_running_job)
    }

    pub fn history(&self, limit: usize) -> Result<Vec<SyncJob>, StateError> {
        self.with_conn(|conn| jobs::get_recent_jobs(conn, limit))
    }

    pub fn delete_all(&self) -> Result<usize, StateError> {
        self.with_conn(jobs::delete_all_jobs)
    }

    /// Fail every `RUNNING` record, appending `line`. Returns the count.
    pub fn fail_orphans(&self, line: &str) -> Result<usize, StateError> {
        let end_time = now_iso8601();
        let entry = stamp_log_line(line);
        self.with_conn(|conn| jobs::mark_interrupted_jobs(conn, &end_time, &entry))
    }

    /// Integrity and size of the job database, for the health endpoint.
    pub fn health(&self) -> StoreHealth {
        self.with_conn(|conn| Ok(db::inspect_job_database(conn)))
            .unwrap_or_else(|e| StoreHealth::unavailable(e.to_string()))
    }
}
