use rusqlite::Connection;
use syncwarden_core::error::StateError;
use tracing::info;

/// Current schema version. Bump this when adding a new migration step.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Create the job tables and run any pending migrations.
pub fn create_tables(conn: &Connection) -> Result<(), StateError> {
    conn.execute_batch(SCHEMA_SQL).map_err(StateError::sqlite)?;
    migrate(conn)?;
    info!("SQLite schema created (version {})", CURRENT_SCHEMA_VERSION);
    Ok(())
}

/// Run incremental schema migrations up to `CURRENT_SCHEMA_VERSION`.
///
/// The `schema_migrations` table tracks which version has been applied.
/// New migrations are appended to the `migrations` array below.
pub fn migrate(conn: &Connection) -> Result<(), StateError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(StateError::sqlite)?;

    let current = applied_version(conn)?;
    if current > CURRENT_SCHEMA_VERSION {
        return Err(StateError::SchemaMigrationRequired {
            current,
            required: CURRENT_SCHEMA_VERSION,
        });
    }

    type MigrationFn = fn(&Connection) -> Result<(), StateError>;

    // Index 0 = V1. V1 is the baseline created by SCHEMA_SQL.
    let migrations: &[MigrationFn] = &[|_conn| Ok(())];

    for version in (current + 1)..=(CURRENT_SCHEMA_VERSION) {
        let idx = (version - 1) as usize;
        if idx < migrations.len() {
            migrations[idx](conn)?;
        }
        conn.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(StateError::sqlite)?;
        info!(version, "Applied schema migration");
    }

    Ok(())
}

/// Highest applied migration version, `0` for a fresh database.
pub fn applied_version(conn: &Connection) -> Result<u32, StateError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(StateError::sqlite)
}

// AUTOINCREMENT keeps ids monotonic across a clear-all.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sync_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    start_time TEXT NOT NULL,
    end_time TEXT,
    status TEXT NOT NULL
        CHECK (status IN ('RUNNING', 'COMPLETED', 'FAILED', 'CANCELLED')),
    logs TEXT NOT NULL DEFAULT '',
    CHECK ((status = 'RUNNING') = (end_time IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_jobs_single_running
    ON sync_jobs(status) WHERE status = 'RUNNING';
"#;
