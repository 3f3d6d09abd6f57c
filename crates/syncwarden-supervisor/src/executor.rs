use std::process::{Command, Stdio};
use syncwarden_core::config::Config;

/// Fallback variable for a per-invocation credential when the source is not a
/// named rclone remote.
pub const FALLBACK_CREDENTIAL_ENV: &str = "SYNCWARDEN_SYNC_CREDENTIAL";

/// Build the executor invocation: `copy <SOURCE> <DESTINATION>` followed by the
/// fixed flag set. Argument order defines the copy direction.
///
/// `--ignore-checksum` and `--no-update-modtime` keep the executor from
/// rewriting objects on an immutable or versioned destination.
pub fn build_sync_command(config: &Config, credential: Option<&str>) -> Command {
    let executor = &config.executor;
    let mut cmd = Command::new(&executor.binary);
    cmd.arg("copy")
        .arg(&config.sync.source)
        .arg(&config.sync.destination)
        .arg("--update")
        .arg("--transfers")
        .arg(executor.transfers.to_string())
        .arg("--verbose")
        .arg("--stats")
        .arg(&executor.stats_interval)
        .arg("--ignore-checksum")
        .arg("--no-update-modtime")
        .args(&executor.extra_args);

    if let Some(token) = credential.map(str::trim).filter(|t| !t.is_empty()) {
        cmd.env(credential_env_var(config), token);
    }

    cmd.stdin(Stdio::null());
    cmd
}

/// Environment variable that carries the per-invocation credential.
///
/// Explicit `executor.credential_env` wins; otherwise rclone's env-config
/// convention `RCLONE_CONFIG_<REMOTE>_TOKEN` is derived from the source remote.
pub fn credential_env_var(config: &Config) -> String {
    if let Some(explicit) = config
        .executor
        .credential_env
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return explicit.to_string();
    }

    match remote_name(&config.sync.source) {
        Some(name) => format!("RCLONE_CONFIG_{}_TOKEN", env_segment(name)),
        None => FALLBACK_CREDENTIAL_ENV.to_string(),
    }
}

/// Named remote of an rclone path (`dropbox:sessions` -> `dropbox`).
/// Local paths and on-the-fly `:backend:` remotes have none.
fn remote_name(path: &str) -> Option<&str> {
    let (name, _) = path.split_once(':')?;
    if name.is_empty() || name.contains(['/', '\\']) {
        return None;
    }
    // Windows drive letters such as `C:\data`.
    if name.len() == 1 && name.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(name)
}

fn env_segment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
