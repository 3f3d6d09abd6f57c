use crate::signal::{KILL_SIGNAL, TERMINATE_SIGNAL, describe_signal};
use std::process::ExitStatus;
use syncwarden_core::constants::SIGTERM_EXIT_CODE;
use syncwarden_core::types::JobStatus;

/// How a supervised run ended. Every variant maps to exactly one terminal
/// [`JobStatus`] and one human-readable trailing log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    ExecutionFailure {
        code: Option<i32>,
        signal: Option<i32>,
    },
    CancelledByOperator {
        code: Option<i32>,
        signal: Option<i32>,
    },
    CancelledBeforeLaunch,
    SpawnFailure {
        binary: String,
        reason: String,
    },
    SupervisionFailure {
        reason: String,
    },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed => JobStatus::Completed,
            Self::CancelledByOperator { .. } | Self::CancelledBeforeLaunch => {
                JobStatus::Cancelled
            }
            Self::ExecutionFailure { .. }
            | Self::SpawnFailure { .. }
            | Self::SupervisionFailure { .. } => JobStatus::Failed,
        }
    }

    /// Final log line; always names the exit code or signal when one exists.
    pub fn trailing_line(&self) -> String {
        match self {
            Self::Completed => "Sync finished successfully. Exit code: 0".to_string(),
            Self::ExecutionFailure { code, signal } => match (code, signal) {
                (Some(code), _) => format!("Sync executor failed. Exit code: {code}"),
                (None, Some(signal)) => format!(
                    "Sync executor terminated by signal {}",
                    describe_signal(*signal)
                ),
                (None, None) => "Sync executor ended without an exit code".to_string(),
            },
            Self::CancelledByOperator { code, signal } => match (code, signal) {
                (_, Some(signal)) => format!(
                    "Sync cancelled by operator. Terminated by signal {}",
                    describe_signal(*signal)
                ),
                (Some(code), None) => format!("Sync cancelled by operator. Exit code: {code}"),
                (None, None) => "Sync cancelled by operator".to_string(),
            },
            Self::CancelledBeforeLaunch => {
                "Sync cancelled by operator before the executor was launched".to_string()
            }
            Self::SpawnFailure { binary, reason } => {
                format!("Critical error: failed to launch sync executor `{binary}`: {reason}")
            }
            Self::SupervisionFailure { reason } => {
                format!("Critical error: {reason}")
            }
        }
    }
}

/// Map an exit code / terminating signal pair to an outcome.
///
/// SIGTERM always counts as a cancellation. SIGKILL and a `128 + SIGTERM` exit
/// code count as one only after an operator cancel (escalation, or an executor
/// that traps SIGTERM and exits on its own).
pub fn classify(code: Option<i32>, signal: Option<i32>, cancel_requested: bool) -> JobOutcome {
    if code == Some(0) {
        return JobOutcome::Completed;
    }
    if let Some(sig) = signal
        && (sig == TERMINATE_SIGNAL || (cancel_requested && sig == KILL_SIGNAL))
    {
        return JobOutcome::CancelledByOperator { code, signal };
    }
    if cancel_requested && code == Some(SIGTERM_EXIT_CODE) {
        return JobOutcome::CancelledByOperator { code, signal };
    }
    JobOutcome::ExecutionFailure { code, signal }
}

pub fn classify_exit(status: ExitStatus, cancel_requested: bool) -> JobOutcome {
    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal = None;
    classify(status.code(), signal, cancel_requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_zero_completes_even_after_cancel() {
        assert_eq!(classify(Some(0), None, false), JobOutcome::Completed);
        assert_eq!(classify(Some(0), None, true), JobOutcome::Completed);
        assert_eq!(
            JobOutcome::Completed.trailing_line(),
            "Sync finished successfully. Exit code: 0"
        );
    }

    #[test]
    fn sigterm_is_cancelled() {
        let outcome = classify(None, Some(TERMINATE_SIGNAL), false);
        assert_eq!(outcome.status(), JobStatus::Cancelled);
        assert!(outcome.trailing_line().contains("SIGTERM"));
    }

    #[test]
    fn sigkill_is_cancelled_only_after_operator_cancel() {
        assert_eq!(
            classify(None, Some(KILL_SIGNAL), true).status(),
            JobStatus::Cancelled
        );
        assert_eq!(
            classify(None, Some(KILL_SIGNAL), false).status(),
            JobStatus::Failed
        );
    }

    #[test]
    fn sigterm_exit_code_is_cancelled_only_after_operator_cancel() {
        let cancelled = classify(Some(SIGTERM_EXIT_CODE), None, true);
        assert_eq!(cancelled.status(), JobStatus::Cancelled);
        assert!(cancelled.trailing_line().ends_with("Exit code: 143"));

        assert_eq!(
            classify(Some(SIGTERM_EXIT_CODE), None, false).status(),
            JobStatus::Failed
        );
    }

    #[test]
    fn nonzero_exit_is_failure_with_code_in_trailer() {
        let outcome = classify(Some(3), None, false);
        assert_eq!(outcome.status(), JobStatus::Failed);
        assert_eq!(
            outcome.trailing_line(),
            "Sync executor failed. Exit code: 3"
        );
        assert_eq!(classify(Some(1), None, true).status(), JobStatus::Failed);
    }

    #[test]
    fn launch_and_supervision_failures_are_failed() {
        let spawn = JobOutcome::SpawnFailure {
            binary: "rclone".into(),
            reason: "No such file or directory (os error 2)".into(),
        };
        assert_eq!(spawn.status(), JobStatus::Failed);
        assert!(spawn.trailing_line().starts_with("Critical error:"));

        let stream = JobOutcome::SupervisionFailure {
            reason: "broken pipe".into(),
        };
        assert_eq!(stream.status(), JobStatus::Failed);
        assert_eq!(
            JobOutcome::CancelledBeforeLaunch.status(),
            JobStatus::Cancelled
        );
    }

    #[cfg(unix)]
    #[test]
    fn classify_exit_reads_raw_wait_status() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(
            classify_exit(ExitStatus::from_raw(0), false),
            JobOutcome::Completed
        );
        // Raw wait status: exit code lives in bits 8..16, signal in the low bits.
        assert_eq!(
            classify_exit(ExitStatus::from_raw(2 << 8), false),
            JobOutcome::ExecutionFailure {
                code: Some(2),
                signal: None
            }
        );
        assert_eq!(
            classify_exit(ExitStatus::from_raw(TERMINATE_SIGNAL), false).status(),
            JobStatus::Cancelled
        );
    }
}
