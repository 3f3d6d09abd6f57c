use syncwarden_core::error::SupervisorError;

/// Signals the supervisor sends to an executor's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupSignal {
    /// Graceful termination request (SIGTERM).
    Terminate,
    /// Forced termination (SIGKILL).
    Kill,
}

#[cfg(unix)]
pub(crate) fn signal_group(pgid: u32, signal: GroupSignal) -> Result<(), SupervisorError> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let sig = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    let raw = i32::try_from(pgid).map_err(|e| SupervisorError::Signal {
        pgid,
        reason: e.to_string(),
    })?;
    killpg(Pid::from_raw(raw), sig).map_err(|errno| SupervisorError::Signal {
        pgid,
        reason: errno.desc().to_string(),
    })
}

#[cfg(not(unix))]
pub(crate) fn signal_group(pgid: u32, _signal: GroupSignal) -> Result<(), SupervisorError> {
    Err(SupervisorError::Signal {
        pgid,
        reason: "process-group signalling requires a unix platform".to_string(),
    })
}

/// Raw number of the graceful termination signal.
#[cfg(unix)]
pub(crate) const TERMINATE_SIGNAL: i32 = nix::sys::signal::Signal::SIGTERM as i32;
#[cfg(not(unix))]
pub(crate) const TERMINATE_SIGNAL: i32 = 15;

/// Raw number of the forced termination signal.
#[cfg(unix)]
pub(crate) const KILL_SIGNAL: i32 = nix::sys::signal::Signal::SIGKILL as i32;
#[cfg(not(unix))]
pub(crate) const KILL_SIGNAL: i32 = 9;

/// `SIGTERM (15)` style description of a raw signal number.
pub(crate) fn describe_signal(signal: i32) -> String {
    #[cfg(unix)]
    if let Ok(sig) = nix::sys::signal::Signal::try_from(signal) {
        return format!("{} ({signal})", sig.as_str());
    }
    format!("signal {signal}")
}
