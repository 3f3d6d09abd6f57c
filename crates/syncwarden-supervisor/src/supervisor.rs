//! Per-job supervision: launch the executor in its own process group, stream
//! its combined output into the job record, then write exactly one terminal
//! transition.

use crate::executor::build_sync_command;
use crate::outcome::{JobOutcome, classify_exit};
use crate::signal::{GroupSignal, signal_group};
use std::io::{BufRead, BufReader, Read};
use std::sync::{Arc, Mutex};
use syncwarden_core::config::Config;
use syncwarden_state::JobStore;
use tracing::{debug, error, info, warn};

/// The one job the process currently supervises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActiveJob {
    pub job_id: i64,
    /// Process group of the executor, set once it has been spawned.
    pub pgid: Option<u32>,
    pub cancel_requested: bool,
    pub escalation_scheduled: bool,
}

impl ActiveJob {
    pub(crate) fn new(job_id: i64) -> Self {
        Self {
            job_id,
            pgid: None,
            cancel_requested: false,
            escalation_scheduled: false,
        }
    }
}

pub(crate) type ActiveSlot = Arc<Mutex<Option<ActiveJob>>>;

pub(crate) struct Supervisor {
    pub config: Arc<Config>,
    pub store: Arc<JobStore>,
    pub slot: ActiveSlot,
    pub job_id: i64,
}

impl Supervisor {
    /// Supervise the job to completion. Runs on the job's own thread.
    pub(crate) fn run(self, credential: Option<String>) {
        let mut guard = FinishGuard {
            store: Arc::clone(&self.store),
            slot: Arc::clone(&self.slot),
            job_id: self.job_id,
            outcome: None,
        };
        guard.outcome = Some(self.supervise(credential.as_deref()));
    }

    fn supervise(&self, credential: Option<&str>) -> JobOutcome {
        let (reader, writer) = match std::io::pipe() {
            Ok(pair) => pair,
            Err(e) => {
                return JobOutcome::SupervisionFailure {
                    reason: format!("failed to create output pipe: {e}"),
                };
            }
        };
        let stdout_writer = match writer.try_clone() {
            Ok(w) => w,
            Err(e) => {
                return JobOutcome::SupervisionFailure {
                    reason: format!("failed to create output pipe: {e}"),
                };
            }
        };

        let mut cmd = build_sync_command(&self.config, credential);
        cmd.stdout(stdout_writer).stderr(writer);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        // Spawn under the slot lock so a concurrent cancel either sees the
        // process group or leaves a flag we observe here.
        let mut child = {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(e) => {
                    return JobOutcome::SupervisionFailure {
                        reason: format!("job slot lock poisoned: {e}"),
                    };
                }
            };
            let Some(active) = slot.as_mut().filter(|a| a.job_id == self.job_id) else {
                return JobOutcome::SupervisionFailure {
                    reason: "active job slot was cleared before launch".to_string(),
                };
            };
            if active.cancel_requested {
                return JobOutcome::CancelledBeforeLaunch;
            }
            match cmd.spawn() {
                Ok(child) => {
                    active.pgid = Some(child.id());
                    child
                }
                Err(e) => {
                    return JobOutcome::SpawnFailure {
                        binary: self.config.executor.binary.clone(),
                        reason: e.to_string(),
                    };
                }
            }
        };
        // Release our copies of the pipe's write end; EOF arrives once the
        // executor and its descendants exit.
        drop(cmd);

        let pgid = child.id();
        info!(job_id = self.job_id, pgid, "sync executor launched");

        let stream_result = self.pump_output(reader);
        if let Err(reason) = &stream_result {
            error!(job_id = self.job_id, %reason, "output stream failed; killing executor");
            if let Err(e) = signal_group(pgid, GroupSignal::Kill) {
                warn!(job_id = self.job_id, error = %e, "failed to kill executor group");
            }
        }

        let waited = child.wait();
        let cancel_requested = self.release_process_group();
        match (stream_result, waited) {
            (Err(reason), _) => JobOutcome::SupervisionFailure {
                reason: format!("failed to read executor output: {reason}"),
            },
            (Ok(()), Err(e)) => {
                let _ = signal_group(pgid, GroupSignal::Kill);
                JobOutcome::SupervisionFailure {
                    reason: format!("failed to wait for executor: {e}"),
                }
            }
            (Ok(()), Ok(status)) => {
                debug!(job_id = self.job_id, ?status, cancel_requested, "executor exited");
                classify_exit(status, cancel_requested)
            }
        }
    }

    /// Append every non-empty output line until EOF. Store errors are logged
    /// and skipped; only a failing read aborts supervision.
    fn pump_output(&self, reader: impl Read) -> Result<(), String> {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).map_err(|e| e.to_string())?;
            if read == 0 {
                return Ok(());
            }
            let text = String::from_utf8_lossy(&buf);
            let line = text.trim();
            if line.is_empty() {
                continue;
            }
            info!(target: "syncwarden::executor", job_id = self.job_id, "{line}");
            match self.store.append_log(self.job_id, line) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(job_id = self.job_id, "record no longer running; line dropped");
                }
                Err(e) => {
                    warn!(job_id = self.job_id, error = %e, "failed to append log line");
                }
            }
        }
    }

    /// Forget the executor's process group once its leader has been reaped,
    /// so a late cancel or escalation cannot signal a reused pgid. Returns
    /// whether a cancel was requested.
    fn release_process_group(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_mut().filter(|a| a.job_id == self.job_id) {
            Some(active) => {
                active.pgid = None;
                active.cancel_requested
            }
            None => false,
        }
    }
}

/// Writes the terminal transition and frees the slot when dropped, so a
/// panicking supervisor still leaves a terminal record behind.
struct FinishGuard {
    store: Arc<JobStore>,
    slot: ActiveSlot,
    job_id: i64,
    outcome: Option<JobOutcome>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(JobOutcome::SupervisionFailure {
            reason: "supervisor thread panicked".to_string(),
        });
        finalize(&self.store, &self.slot, self.job_id, &outcome);
    }
}

/// Terminal write followed by slot release, both under the slot lock so no
/// new admission can observe the old job half-finished.
pub(crate) fn finalize(store: &JobStore, slot: &ActiveSlot, job_id: i64, outcome: &JobOutcome) {
    let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
    let status = outcome.status();
    match store.finish(job_id, status, &outcome.trailing_line()) {
        Ok(true) => info!(job_id, %status, "sync job finished"),
        Ok(false) => warn!(job_id, "job was no longer running at finish"),
        Err(e) => error!(job_id, error = %e, "failed to record job outcome"),
    }
    if slot.as_ref().is_some_and(|a| a.job_id == job_id) {
        *slot = None;
    }
}
