/// Default data directory name under home.
pub const DEFAULT_DATA_DIR: &str = ".syncwarden";

/// Global config file name inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// SQLite database file name.
pub const STATE_DB_FILE: &str = "sync.db";

/// Environment variable prefix for config overrides.
pub const ENV_PREFIX: &str = "SYNCWARDEN";

/// Header carrying the shared API secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Default number of parallel transfers passed to the executor.
pub const DEFAULT_TRANSFERS: u32 = 4;

/// Default number of records returned by a history query.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Default number of trailing log characters returned by status queries.
pub const DEFAULT_LOG_TAIL_CHARS: usize = 2000;

/// Exit code convention for a process that exits on its own after SIGTERM (128 + 15).
pub const SIGTERM_EXIT_CODE: i32 = 143;

/// Log line appended to orphaned jobs during startup reconciliation.
pub const INTERRUPTED_BY_RESTART: &str =
    "Job interrupted by restart; marked FAILED during startup reconciliation";
