use crate::constants;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source and destination remotes. The order of the two strictly defines the
/// copy direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_destination")]
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_transfers")]
    pub transfers: u32,
    #[serde(default = "default_stats_interval")]
    pub stats_interval: String,
    /// Environment variable that receives a per-invocation credential.
    /// Derived from the source remote name when unset.
    #[serde(default)]
    pub credential_env: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds between SIGTERM and SIGKILL escalation after a cancel. `0` disables escalation.
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_log_tail_chars")]
    pub log_tail_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_source() -> String {
    "dropbox:sessions".into()
}
fn default_destination() -> String {
    "wasabi:sessions".into()
}
fn default_binary() -> String {
    "rclone".into()
}
fn default_transfers() -> u32 {
    constants::DEFAULT_TRANSFERS
}
fn default_stats_interval() -> String {
    "2s".into()
}
fn default_kill_grace_secs() -> u64 {
    30
}
fn default_shutdown_timeout_secs() -> u64 {
    10
}
fn default_data_dir() -> String {
    format!("~/{}", constants::DEFAULT_DATA_DIR)
}
fn default_busy_timeout() -> u32 {
    5000
}
fn default_cache_size() -> i32 {
    -64000
}
fn default_bind() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_history_limit() -> usize {
    constants::DEFAULT_HISTORY_LIMIT
}
fn default_log_tail_chars() -> usize {
    constants::DEFAULT_LOG_TAIL_CHARS
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            destination: default_destination(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            transfers: default_transfers(),
            stats_interval: default_stats_interval(),
            credential_env: None,
            extra_args: Vec::new(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            kill_grace_secs: default_kill_grace_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            busy_timeout_ms: default_busy_timeout(),
            cache_size: default_cache_size(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            api_secret: None,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            log_tail_chars: default_log_tail_chars(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with layered precedence:
    /// 1. Environment variables `SYNCWARDEN_<SECTION>_<KEY>` (highest priority)
    /// 2. Explicit config file (from `--config`)
    /// 3. Global config: `~/.syncwarden/config.toml`
    /// 4. Built-in defaults (lowest priority)
    ///
    /// Only fields explicitly set in a higher-priority layer override lower layers.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let global = dirs::home_dir().map(|home| {
            home.join(constants::DEFAULT_DATA_DIR)
                .join(constants::CONFIG_FILE)
        });
        Self::load_layers(global.as_deref(), config_file)
    }

    fn load_layers(
        global_file: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if let Some(global_path) = global_file
            && global_path.exists()
        {
            let raw = load_toml_value(global_path)?;
            merge_toml_values(&mut merged, &raw);
        }

        if let Some(cf) = config_file {
            if !cf.exists() {
                return Err(ConfigError::NotFound {
                    path: cf.display().to_string(),
                });
            }
            let raw = load_toml_value(cf)?;
            merge_toml_values(&mut merged, &raw);
        }

        let config_str =
            toml::to_string(&merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());

        config.storage.data_dir = expand_tilde(&config.storage.data_dir);
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the supervisor cannot run safely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let source = self.sync.source.trim();
        let destination = self.sync.destination.trim();
        if source.is_empty() {
            return Err(ConfigError::invalid_value("sync.source", "must not be empty"));
        }
        if destination.is_empty() {
            return Err(ConfigError::invalid_value(
                "sync.destination",
                "must not be empty",
            ));
        }
        if source == destination {
            return Err(ConfigError::invalid_value(
                "sync.destination",
                "must differ from sync.source",
            ));
        }
        if self.executor.binary.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "executor.binary",
                "must not be empty",
            ));
        }
        if self.executor.transfers == 0 {
            return Err(ConfigError::invalid_value(
                "executor.transfers",
                "must be at least 1",
            ));
        }
        if self.status.history_limit == 0 {
            return Err(ConfigError::invalid_value(
                "status.history_limit",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Path of the SQLite job database.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir).join(constants::STATE_DB_FILE)
    }

    /// Configured API secret, treating blank values as unset.
    pub fn api_secret(&self) -> Option<&str> {
        self.server
            .api_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Load a TOML file as a raw `toml::Value` (preserving only explicitly-set fields).
fn load_toml_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    content
        .parse::<toml::Value>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Deep-merge `overlay` into `base`. Only keys present in `overlay` are written.
fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    if let (toml::Value::Table(base_map), toml::Value::Table(overlay_map)) = (base, overlay) {
        for (key, overlay_val) in overlay_map {
            if let Some(base_val) = base_map.get_mut(key) {
                if base_val.is_table() && overlay_val.is_table() {
                    merge_toml_values(base_val, overlay_val);
                } else {
                    *base_val = overlay_val.clone();
                }
            } else {
                base_map.insert(key.clone(), overlay_val.clone());
            }
        }
    }
}

/// Apply environment variable overrides to config fields.
/// Convention: `SYNCWARDEN_<SECTION>_<KEY>` in UPPER_SNAKE_CASE.
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(&format!("{}_{}", constants::ENV_PREFIX, key));

    if let Some(v) = var("SYNC_SOURCE") {
        config.sync.source = v;
    }
    if let Some(v) = var("SYNC_DESTINATION") {
        config.sync.destination = v;
    }
    if let Some(v) = var("EXECUTOR_BINARY") {
        config.executor.binary = v;
    }
    if let Some(v) = var("EXECUTOR_TRANSFERS")
        && let Ok(n) = v.parse()
    {
        config.executor.transfers = n;
    }
    if let Some(v) = var("EXECUTOR_STATS_INTERVAL") {
        config.executor.stats_interval = v;
    }
    if let Some(v) = var("EXECUTOR_CREDENTIAL_ENV") {
        config.executor.credential_env = Some(v);
    }
    if let Some(v) = var("SUPERVISOR_KILL_GRACE_SECS")
        && let Ok(n) = v.parse()
    {
        config.supervisor.kill_grace_secs = n;
    }
    if let Some(v) = var("SUPERVISOR_SHUTDOWN_TIMEOUT_SECS")
        && let Ok(n) = v.parse()
    {
        config.supervisor.shutdown_timeout_secs = n;
    }
    if let Some(v) = var("STORAGE_DATA_DIR") {
        config.storage.data_dir = v;
    }
    if let Some(v) = var("STORAGE_BUSY_TIMEOUT_MS")
        && let Ok(n) = v.parse()
    {
        config.storage.busy_timeout_ms = n;
    }
    if let Some(v) = var("SERVER_BIND") {
        config.server.bind = v;
    }
    if let Some(v) = var("SERVER_PORT")
        && let Ok(n) = v.parse()
    {
        config.server.port = n;
    }
    if let Some(v) = var("SERVER_API_SECRET") {
        config.server.api_secret = Some(v);
    }
    if let Some(v) = var("STATUS_HISTORY_LIMIT")
        && let Ok(n) = v.parse()
    {
        config.status.history_limit = n;
    }
    if let Some(v) = var("STATUS_LOG_TAIL_CHARS")
        && let Ok(n) = v.parse()
    {
        config.status.log_tail_chars = n;
    }
    if let Some(v) = var("LOGGING_LEVEL") {
        config.logging.level = v;
    }
}

fn expand_tilde(path: &str) -> String {
    if path.starts_with('~')
        && let Some(home) = dirs::home_dir()
    {
        return path.replacen('~', &home.to_string_lossy(), 1);
    }
    path.to_string()
}
