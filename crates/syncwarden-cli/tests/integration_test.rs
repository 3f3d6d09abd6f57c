//! End-to-end tests of the `syncwarden` binary against a throwaway store.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct Sandbox {
    dir: TempDir,
    config: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let config = dir.path().join("config.toml");
        std::fs::write(
            &config,
            format!(
                "[sync]\nsource = \"dropbox:sessions\"\ndestination = \"wasabi:archive\"\n\n\
                 [storage]\ndata_dir = \"{}\"\n",
                data_dir.display()
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn home(&self) -> &Path {
        self.dir.path()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_syncwarden"))
            .arg("--config")
            .arg(&self.config)
            .args(args)
            // Keep the user's global config and overrides out of the test.
            .env("HOME", self.home())
            .env_remove("RUST_LOG")
            .env_remove("SYNCWARDEN_SYNC_SOURCE")
            .env_remove("SYNCWARDEN_SYNC_DESTINATION")
            .env_remove("SYNCWARDEN_STORAGE_DATA_DIR")
            .output()
            .expect("failed to run syncwarden")
    }

    fn run_json(&self, args: &[&str]) -> Value {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "syncwarden {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
            panic!(
                "stdout is not JSON ({e}): {}",
                String::from_utf8_lossy(&output.stdout)
            )
        })
    }
}

#[test]
fn status_on_fresh_store_is_idle() {
    let sandbox = Sandbox::new();
    let status = sandbox.run_json(&["status"]);
    assert_eq!(status["status"], "IDLE");
    assert_eq!(status["logs"], "No jobs run yet.");

    let history = sandbox.run_json(&["status", "--history"]);
    assert_eq!(history, Value::Array(vec![]));
}

#[test]
fn clear_history_on_empty_store_deletes_nothing() {
    let sandbox = Sandbox::new();
    let cleared = sandbox.run_json(&["clear-history"]);
    assert_eq!(cleared["status"], "cleared");
    assert_eq!(cleared["deleted"], 0);
}

#[test]
fn missing_explicit_config_fails() {
    let sandbox = Sandbox::new();
    let output = Command::new(env!("CARGO_BIN_EXE_syncwarden"))
        .arg("--config")
        .arg(sandbox.home().join("absent.toml"))
        .arg("status")
        .env("HOME", sandbox.home())
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config file not found"), "stderr: {stderr}");
}

#[test]
fn invalid_config_is_rejected() {
    let sandbox = Sandbox::new();
    std::fs::write(
        &sandbox.config,
        "[sync]\nsource = \"same:x\"\ndestination = \"same:x\"\n",
    )
    .unwrap();
    let output = sandbox.run(&["status"]);
    assert!(!output.status.success());
}

#[test]
fn remote_against_closed_port_fails() {
    let sandbox = Sandbox::new();
    // Bind then drop to find a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = format!("http://127.0.0.1:{port}");
    let output = sandbox.run(&["remote", "status", "--url", &url]);
    assert!(!output.status.success());
}
