//! Single-flight job admission and control.
//!
//! `JobManager` owns the one active-job slot. Every admission, cancellation
//! and terminal transition takes the slot lock first, then the store
//! connection, so the two never disagree about which job is live.

use crate::outcome::JobOutcome;
use crate::signal::{GroupSignal, signal_group};
use crate::supervisor::{ActiveJob, ActiveSlot, Supervisor, finalize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use syncwarden_core::config::Config;
use syncwarden_core::constants::INTERRUPTED_BY_RESTART;
use syncwarden_core::error::{StateError, SupervisorError};
use syncwarden_core::types::{SyncJob, sync_direction};
use syncwarden_state::JobStore;
use tracing::{info, warn};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { job_id: i64 },
    /// Another job is already running; nothing was created or spawned.
    Ignored { job_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Success { job_id: i64 },
    Ignored,
    Error { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusView {
    Idle,
    Latest(SyncJob),
    History(Vec<SyncJob>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared { deleted: usize },
    Ignored { job_id: i64 },
}

pub struct JobManager {
    config: Arc<Config>,
    store: Arc<JobStore>,
    slot: ActiveSlot,
}

impl JobManager {
    pub fn new(config: Arc<Config>, store: Arc<JobStore>) -> Self {
        Self {
            config,
            store,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the configured job database and build a manager over it.
    pub fn open(config: Arc<Config>) -> Result<Self, SupervisorError> {
        let store = JobStore::open(&config.db_path(), &config.storage)?;
        Ok(Self::new(config, Arc::new(store)))
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    fn lock_slot(&self) -> Result<MutexGuard<'_, Option<ActiveJob>>, SupervisorError> {
        self.slot.lock().map_err(SupervisorError::lock_poisoned)
    }

    /// Fail every record a previous process left `RUNNING`.
    ///
    /// Must run before the control surface accepts requests. Skipped with a
    /// warning if this manager already supervises a job.
    pub fn reconcile_on_startup(&self) -> Result<usize, SupervisorError> {
        let slot = self.lock_slot()?;
        if let Some(active) = slot.as_ref() {
            warn!(
                job_id = active.job_id,
                "Skipping startup reconciliation: a job is already active"
            );
            return Ok(0);
        }
        let count = self.store.fail_orphans(INTERRUPTED_BY_RESTART)?;
        if count > 0 {
            warn!(count, "Marked interrupted jobs as FAILED");
        }
        Ok(count)
    }

    /// Admit a new sync job unless one is already running.
    pub fn start(&self, credential: Option<String>) -> Result<StartOutcome, SupervisorError> {
        let mut slot = self.lock_slot()?;
        if let Some(active) = slot.as_ref() {
            info!(job_id = active.job_id, "Sync already running; start ignored");
            return Ok(StartOutcome::Ignored {
                job_id: active.job_id,
            });
        }
        if let Some(running) = self.store.running()? {
            info!(job_id = running.id, "Store has a running job; start ignored");
            return Ok(StartOutcome::Ignored { job_id: running.id });
        }

        let banner = format!(
            "Job started: {}",
            sync_direction(&self.config.sync.source, &self.config.sync.destination)
        );
        let job_id = match self.store.insert_running(&banner) {
            Ok(id) => id,
            Err(StateError::SyncInProgress { job_id }) => {
                return Ok(StartOutcome::Ignored { job_id });
            }
            Err(e) => return Err(e.into()),
        };
        *slot = Some(ActiveJob::new(job_id));

        let supervisor = Supervisor {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            slot: Arc::clone(&self.slot),
            job_id,
        };
        let spawned = thread::Builder::new()
            .name(format!("sync-job-{job_id}"))
            .spawn(move || supervisor.run(credential));
        drop(slot);

        if let Err(source) = spawned {
            let outcome = JobOutcome::SupervisionFailure {
                reason: format!("failed to start supervisor thread: {source}"),
            };
            finalize(&self.store, &self.slot, job_id, &outcome);
            return Err(SupervisorError::ThreadSpawn { job_id, source });
        }

        info!(job_id, "Sync job started");
        Ok(StartOutcome::Started { job_id })
    }

    /// Request graceful termination of the active job. Does not wait.
    pub fn cancel(&self) -> Result<CancelOutcome, SupervisorError> {
        let mut slot = self.lock_slot()?;
        let Some(active) = slot.as_mut() else {
            return Ok(CancelOutcome::Ignored);
        };
        let job_id = active.job_id;
        let Some(pgid) = active.pgid else {
            active.cancel_requested = true;
            info!(job_id, "Cancel requested with no live executor group");
            return Ok(CancelOutcome::Success { job_id });
        };

        match signal_group(pgid, GroupSignal::Terminate) {
            Ok(()) => {
                active.cancel_requested = true;
                info!(job_id, pgid, "Sent SIGTERM to executor process group");
                let grace = self.config.supervisor.kill_grace_secs;
                if grace > 0 && !active.escalation_scheduled {
                    active.escalation_scheduled = true;
                    self.schedule_escalation(job_id, pgid, Duration::from_secs(grace));
                }
                Ok(CancelOutcome::Success { job_id })
            }
            Err(e) => {
                warn!(job_id, error = %e, "Cancel failed");
                Ok(CancelOutcome::Error {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// SIGKILL the group if the same job is still active after `grace`.
    fn schedule_escalation(&self, job_id: i64, pgid: u32, grace: Duration) {
        let slot = Arc::clone(&self.slot);
        let store = Arc::clone(&self.store);
        let spawned = thread::Builder::new()
            .name(format!("sync-job-{job_id}-escalation"))
            .spawn(move || {
                let deadline = Instant::now() + grace;
                loop {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::sleep(IDLE_POLL_INTERVAL.min(deadline - now));
                    if !is_same_job(&slot, job_id, pgid) {
                        return;
                    }
                }

                let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
                let still_active = guard
                    .as_ref()
                    .is_some_and(|a| a.job_id == job_id && a.pgid == Some(pgid));
                if !still_active {
                    return;
                }
                let line = format!(
                    "Executor still running {}s after SIGTERM; sending SIGKILL to process group {pgid}",
                    grace.as_secs()
                );
                warn!(job_id, pgid, "{line}");
                if let Err(e) = store.append_log(job_id, &line) {
                    warn!(job_id, error = %e, "Failed to record escalation");
                }
                if let Err(e) = signal_group(pgid, GroupSignal::Kill) {
                    warn!(job_id, error = %e, "SIGKILL escalation failed");
                }
            });
        if let Err(e) = spawned {
            warn!(job_id, error = %e, "Failed to schedule SIGKILL escalation");
        }
    }

    /// Latest record, or the recent history newest first, with logs tailed.
    pub fn status(&self, include_history: bool) -> Result<StatusView, SupervisorError> {
        let tail = self.config.status.log_tail_chars;
        if include_history {
            let jobs = self.store.history(self.config.status.history_limit)?;
            return Ok(StatusView::History(
                jobs.into_iter().map(|job| job.with_log_tail(tail)).collect(),
            ));
        }
        Ok(match self.store.latest()? {
            Some(job) => StatusView::Latest(job.with_log_tail(tail)),
            None => StatusView::Idle,
        })
    }

    /// Delete every record, unless a job is running.
    pub fn clear_history(&self) -> Result<ClearOutcome, SupervisorError> {
        let slot = self.lock_slot()?;
        if let Some(active) = slot.as_ref() {
            return Ok(ClearOutcome::Ignored {
                job_id: active.job_id,
            });
        }
        if let Some(running) = self.store.running()? {
            return Ok(ClearOutcome::Ignored { job_id: running.id });
        }
        let deleted = self.store.delete_all()?;
        info!(deleted, "Cleared job history");
        Ok(ClearOutcome::Cleared { deleted })
    }

    pub fn active_job_id(&self) -> Option<i64> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|a| a.job_id)
    }

    /// Block until no job is active or `timeout` elapses. Returns `true` when idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.active_job_id().is_none() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Cancel the active job and wait, bounded by `supervisor.shutdown_timeout_secs`,
    /// for its terminal status to be recorded.
    pub fn shutdown(&self) -> bool {
        let Some(job_id) = self.active_job_id() else {
            return true;
        };
        info!(job_id, "Shutting down: cancelling active sync job");
        match self.cancel() {
            Ok(CancelOutcome::Error { reason }) => {
                warn!(job_id, %reason, "Shutdown cancel failed");
            }
            Err(e) => warn!(job_id, error = %e, "Shutdown cancel failed"),
            Ok(_) => {}
        }
        let timeout = Duration::from_secs(self.config.supervisor.shutdown_timeout_secs);
        let idle = self.wait_until_idle(timeout);
        if !idle {
            warn!(
                job_id,
                timeout_secs = timeout.as_secs(),
                "Sync job still running at shutdown; it will be reconciled on next start"
            );
        }
        idle
    }
}

fn is_same_job(slot: &Mutex<Option<ActiveJob>>, job_id: i64, pgid: u32) -> bool {
    let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    guard
        .as_ref()
        .is_some_and(|a| a.job_id == job_id && a.pgid == Some(pgid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncwarden_core::config::StorageConfig;
    use syncwarden_core::types::JobStatus;
    use tempfile::TempDir;

    fn manager() -> (TempDir, JobManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(&dir.path().join("sync.db"), &StorageConfig::default()).unwrap();
        let manager = JobManager::new(Arc::new(Config::default()), Arc::new(store));
        (dir, manager)
    }

    #[test]
    fn cancel_without_active_job_is_ignored_and_mutates_nothing() {
        let (_dir, manager) = manager();
        assert_eq!(manager.cancel().unwrap(), CancelOutcome::Ignored);
        assert!(manager.store().latest().unwrap().is_none());
    }

    #[test]
    fn empty_store_reports_idle() {
        let (_dir, manager) = manager();
        assert_eq!(manager.status(false).unwrap(), StatusView::Idle);
        assert_eq!(manager.status(true).unwrap(), StatusView::History(vec![]));
        assert_eq!(manager.active_job_id(), None);
        assert!(manager.wait_until_idle(Duration::ZERO));
        assert!(manager.shutdown());
    }

    #[test]
    fn start_is_ignored_while_store_has_running_record() {
        let (_dir, manager) = manager();
        let orphan = manager.store().insert_running("banner").unwrap();

        assert_eq!(
            manager.start(None).unwrap(),
            StartOutcome::Ignored { job_id: orphan }
        );
        assert_eq!(manager.store().history(20).unwrap().len(), 1);
    }

    #[test]
    fn reconcile_fails_orphans_then_start_is_admitted_by_store() {
        let (_dir, manager) = manager();
        let orphan = manager.store().insert_running("banner").unwrap();

        assert_eq!(manager.reconcile_on_startup().unwrap(), 1);
        let job = manager.store().get(orphan).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.end_time.is_some());
        assert!(job.logs.contains("interrupted by restart"));
        assert!(manager.store().running().unwrap().is_none());
    }

    #[test]
    fn reconcile_is_skipped_while_a_job_is_active() {
        let (_dir, manager) = manager();
        let id = manager.store().insert_running("banner").unwrap();
        *manager.slot.lock().unwrap() = Some(ActiveJob::new(id));

        assert_eq!(manager.reconcile_on_startup().unwrap(), 0);
        assert_eq!(
            manager.store().get(id).unwrap().unwrap().status,
            JobStatus::Running
        );
    }

    #[test]
    fn cancel_before_launch_sets_flag_without_signalling() {
        let (_dir, manager) = manager();
        *manager.slot.lock().unwrap() = Some(ActiveJob::new(7));

        assert_eq!(
            manager.cancel().unwrap(),
            CancelOutcome::Success { job_id: 7 }
        );
        let slot = manager.slot.lock().unwrap();
        let active = slot.as_ref().unwrap();
        assert!(active.cancel_requested);
        assert!(!active.escalation_scheduled);
    }

    #[test]
    fn clear_history_refused_while_active_then_clears() {
        let (_dir, manager) = manager();
        let first = manager.store().insert_running("banner").unwrap();
        manager
            .store()
            .finish(first, JobStatus::Completed, "Exit code: 0")
            .unwrap();
        let second = manager.store().insert_running("banner").unwrap();
        *manager.slot.lock().unwrap() = Some(ActiveJob::new(second));

        assert_eq!(
            manager.clear_history().unwrap(),
            ClearOutcome::Ignored { job_id: second }
        );

        finalize(
            &manager.store,
            &manager.slot,
            second,
            &JobOutcome::Completed,
        );
        assert_eq!(manager.active_job_id(), None);
        assert_eq!(
            manager.clear_history().unwrap(),
            ClearOutcome::Cleared { deleted: 2 }
        );
        assert_eq!(manager.status(false).unwrap(), StatusView::Idle);
    }

    #[test]
    fn status_tails_long_logs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(&dir.path().join("sync.db"), &StorageConfig::default()).unwrap();
        let mut config = Config::default();
        config.status.log_tail_chars = 10;
        let manager = JobManager::new(Arc::new(config), Arc::new(store));

        let id = manager.store().insert_running("banner").unwrap();
        manager
            .store()
            .append_log(id, "a long line of executor output")
            .unwrap();

        let StatusView::Latest(job) = manager.status(false).unwrap() else {
            panic!("expected latest record");
        };
        assert_eq!(job.id, id);
        assert_eq!(job.logs.chars().count(), 10);
        assert!(job.logs.ends_with("output\n"));
    }
}
