use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use syncwarden_core::error::StateError;
use syncwarden_core::types::{JobStatus, SyncJob};

const JOB_COLUMNS: &str = "id, start_time, end_time, status, logs";

/// Insert a new `RUNNING` job seeded with `initial_logs`. Returns the assigned id.
///
/// The single-running unique index rejects a second `RUNNING` row; that case is
/// reported as [`StateError::SyncInProgress`] carrying the existing job's id.
pub fn create_running_job(
    conn: &Connection,
    start_time: &str,
    initial_logs: &str,
) -> Result<i64, StateError> {
    match conn.execute(
        "INSERT INTO sync_jobs (start_time, status, logs) VALUES (?1, ?2, ?3)",
        params![start_time, JobStatus::Running.as_str(), initial_logs],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            if let Some(active) = get_running_job(conn)? {
                return Err(StateError::SyncInProgress { job_id: active.id });
            }
            Err(StateError::Sqlite(
                "sync_jobs constraint violation while creating job".to_string(),
            ))
        }
        Err(e) => Err(StateError::sqlite(e)),
    }
}

/// Append one already-formatted entry to a running job's logs.
///
/// Returns `false` when the job is missing or already terminal; terminal
/// records never grow.
pub fn append_log(conn: &Connection, job_id: i64, entry: &str) -> Result<bool, StateError> {
    let updated = conn
        .execute(
            "UPDATE sync_jobs SET logs = logs || ?1 WHERE id = ?2 AND status = 'RUNNING'",
            params![entry, job_id],
        )
        .map_err(StateError::sqlite)?;
    Ok(updated == 1)
}

/// Transition a running job to a terminal status, appending its trailing log
/// entry and setting `end_time` in the same statement.
///
/// Returns `false` if the job was not `RUNNING` (the transition happens once).
pub fn finish_job(
    conn: &Connection,
    job_id: i64,
    status: JobStatus,
    end_time: &str,
    trailing_entry: &str,
) -> Result<bool, StateError> {
    if !status.is_terminal() {
        return Err(StateError::InvalidStatus(format!(
            "cannot finish job {job_id} with non-terminal status {status}"
        )));
    }
    let updated = conn
        .execute(
            "UPDATE sync_jobs SET status = ?1, end_time = ?2, logs = logs || ?3
             WHERE id = ?4 AND status = 'RUNNING'",
            params![status.as_str(), end_time, trailing_entry, job_id],
        )
        .map_err(StateError::sqlite)?;
    Ok(updated == 1)
}

/// Get a job by id.
pub fn get_job(conn: &Connection, job_id: i64) -> Result<Option<SyncJob>, StateError> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?1"),
        params![job_id],
        row_to_job,
    )
    .optional()
    .map_err(StateError::sqlite)
}

/// Get the most recent job (highest id), if any.
pub fn get_latest_job(conn: &Connection) -> Result<Option<SyncJob>, StateError> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM sync_jobs ORDER BY id DESC LIMIT 1"),
        [],
        row_to_job,
    )
    .optional()
    .map_err(StateError::sqlite)
}

/// Get the running job, if any.
pub fn get_running_job(conn: &Connection) -> Result<Option<SyncJob>, StateError> {
    conn.query_row(
        &format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE status = 'RUNNING' ORDER BY id DESC LIMIT 1"
        ),
        [],
        row_to_job,
    )
    .optional()
    .map_err(StateError::sqlite)
}

/// Get up to `limit` most recent jobs, newest first.
pub fn get_recent_jobs(conn: &Connection, limit: usize) -> Result<Vec<SyncJob>, StateError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs ORDER BY id DESC LIMIT ?1"
        ))
        .map_err(StateError::sqlite)?;

    let jobs = stmt
        .query_map(params![limit as i64], row_to_job)
        .map_err(StateError::sqlite)?;

    jobs.collect::<Result<Vec<_>, _>>()
        .map_err(StateError::sqlite)
}

/// Delete every job record. Returns the number of rows removed.
pub fn delete_all_jobs(conn: &Connection) -> Result<usize, StateError> {
    conn.execute("DELETE FROM sync_jobs", [])
        .map_err(StateError::sqlite)
}

/// Mark all running jobs as failed, appending `entry` and setting `end_time`.
/// Returns the count of affected jobs.
pub fn mark_interrupted_jobs(
    conn: &Connection,
    end_time: &str,
    entry: &str,
) -> Result<usize, StateError> {
    conn.execute(
        "UPDATE sync_jobs SET status = 'FAILED', end_time = ?1, logs = logs || ?2
         WHERE status = 'RUNNING'",
        params![end_time, entry],
    )
    .map_err(StateError::sqlite)
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<SyncJob> {
    let raw_status: String = row.get(3)?;
    let status = raw_status.parse::<JobStatus>().map_err(|bad| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            Box::new(StateError::InvalidStatus(bad)),
        )
    })?;
    Ok(SyncJob {
        id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        status,
        logs: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use syncwarden_core::config::StorageConfig;
    use crate::schema;
    use tempfile::{TempDir, tempdir};

    fn setup_test_db() -> (TempDir, Connection) {
        let dir = tempdir().unwrap();
        let conn = db::open_job_database(&dir.path().join("test.db"), &StorageConfig::default()).unwrap();
        schema::create_tables(&conn).unwrap();
        (dir, conn)
    }

    fn finished_job(conn: &Connection, status: JobStatus) -> i64 {
        let id = create_running_job(conn, "2026-01-01T00:00:00Z", "banner\n").unwrap();
        assert!(finish_job(conn, id, status, "2026-01-01T00:10:00Z", "done\n").unwrap());
        id
    }

    #[test]
    fn test_create_and_get_running_job() {
        let (_dir, conn) = setup_test_db();

        let id = create_running_job(&conn, "2026-01-01T00:00:00Z", "banner\n").unwrap();
        let running = get_running_job(&conn).unwrap().unwrap();
        assert_eq!(running.id, id);
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.start_time, "2026-01-01T00:00:00Z");
        assert!(running.end_time.is_none());
        assert_eq!(running.logs, "banner\n");
    }

    #[test]
    fn test_get_running_job_returns_none_when_no_jobs() {
        let (_dir, conn) = setup_test_db();
        assert!(get_running_job(&conn).unwrap().is_none());
        assert!(get_latest_job(&conn).unwrap().is_none());
    }

    #[test]
    fn test_create_rejects_second_running_job() {
        let (_dir, conn) = setup_test_db();

        let first = create_running_job(&conn, "t0", "a\n").unwrap();
        let err = create_running_job(&conn, "t1", "b\n").unwrap_err();
        match err {
            StateError::SyncInProgress { job_id } => assert_eq!(job_id, first),
            other => panic!("unexpected error: {other}"),
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sync_jobs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_new_job_allowed_after_previous_finishes() {
        let (_dir, conn) = setup_test_db();
        let first = finished_job(&conn, JobStatus::Completed);
        let second = create_running_job(&conn, "t1", "b\n").unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_append_log_preserves_order() {
        let (_dir, conn) = setup_test_db();
        let id = create_running_job(&conn, "t0", "banner\n").unwrap();

        for i in 0..5 {
            assert!(append_log(&conn, id, &format!("line {i}\n")).unwrap());
        }

        let job = get_job(&conn, id).unwrap().unwrap();
        assert_eq!(
            job.logs,
            "banner\nline 0\nline 1\nline 2\nline 3\nline 4\n"
        );
    }

    #[test]
    fn test_append_log_is_noop_after_terminal() {
        let (_dir, conn) = setup_test_db();
        let id = finished_job(&conn, JobStatus::Failed);

        assert!(!append_log(&conn, id, "late\n").unwrap());
        let job = get_job(&conn, id).unwrap().unwrap();
        assert_eq!(job.logs, "banner\ndone\n");
    }

    #[test]
    fn test_append_log_unknown_job() {
        let (_dir, conn) = setup_test_db();
        assert!(!append_log(&conn, 404, "x\n").unwrap());
    }

    #[test]
    fn test_finish_job_sets_end_time_once() {
        let (_dir, conn) = setup_test_db();
        let id = create_running_job(&conn, "t0", "banner\n").unwrap();

        assert!(finish_job(&conn, id, JobStatus::Cancelled, "t1", "cancelled\n").unwrap());
        assert!(!finish_job(&conn, id, JobStatus::Completed, "t2", "again\n").unwrap());

        let job = get_job(&conn, id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.end_time.as_deref(), Some("t1"));
        assert_eq!(job.logs, "banner\ncancelled\n");
    }

    #[test]
    fn test_finish_job_rejects_running_status() {
        let (_dir, conn) = setup_test_db();
        let id = create_running_job(&conn, "t0", "banner\n").unwrap();
        let err = finish_job(&conn, id, JobStatus::Running, "t1", "x\n").unwrap_err();
        assert!(matches!(err, StateError::InvalidStatus(_)), "got {err}");
    }

    #[test]
    fn test_get_recent_jobs_ordering_and_limit() {
        let (_dir, conn) = setup_test_db();
        let ids: Vec<i64> = (0..25)
            .map(|_| finished_job(&conn, JobStatus::Completed))
            .collect();

        let recent = get_recent_jobs(&conn, 20).unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].id, ids[24]);
        assert_eq!(recent[19].id, ids[5]);
        assert!(recent.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[test]
    fn test_get_latest_job_by_id() {
        let (_dir, conn) = setup_test_db();
        finished_job(&conn, JobStatus::Failed);
        let newest = finished_job(&conn, JobStatus::Completed);
        assert_eq!(get_latest_job(&conn).unwrap().unwrap().id, newest);
    }

    #[test]
    fn test_delete_all_jobs_keeps_ids_monotonic() {
        let (_dir, conn) = setup_test_db();
        let before = finished_job(&conn, JobStatus::Completed);
        finished_job(&conn, JobStatus::Completed);

        assert_eq!(delete_all_jobs(&conn).unwrap(), 2);
        assert!(get_latest_job(&conn).unwrap().is_none());

        let after = create_running_job(&conn, "t", "b\n").unwrap();
        assert!(after > before + 1);
    }

    #[test]
    fn test_mark_interrupted_jobs() {
        let (_dir, conn) = setup_test_db();
        let done = finished_job(&conn, JobStatus::Completed);
        let orphan = create_running_job(&conn, "t0", "banner\n").unwrap();

        let count = mark_interrupted_jobs(&conn, "t9", "interrupted by restart\n").unwrap();
        assert_eq!(count, 1);

        let orphan = get_job(&conn, orphan).unwrap().unwrap();
        assert_eq!(orphan.status, JobStatus::Failed);
        assert_eq!(orphan.end_time.as_deref(), Some("t9"));
        assert!(orphan.logs.ends_with("interrupted by restart\n"));

        let done = get_job(&conn, done).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.logs, "banner\ndone\n");

        assert_eq!(mark_interrupted_jobs(&conn, "t10", "x\n").unwrap(), 0);
    }

    #[test]
    fn test_corrupt_status_surfaces_as_error() {
        let (_dir, conn) = setup_test_db();
        conn.execute_batch(
            "PRAGMA ignore_check_constraints = ON;
             INSERT INTO sync_jobs (start_time, end_time, status) VALUES ('t0', 't1', 'BOGUS');",
        )
        .unwrap();
        assert!(get_latest_job(&conn).is_err());
    }
}
