//! Signal delivery to a child's process group.
//!
//! Every child is spawned as the leader of its own process group (see
//! `build_command`), so signalling the group reaches anything the child
//! started as well. Callers must only pass the pid of a child that has not
//! been reaped yet; the unreaped leader keeps the group id reserved.

use procsup_common::{SupervisorError, SupervisorResult};
use tracing::debug;

/// Outcome of delivering a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    /// The signal was delivered
    Delivered,
    /// No such process group; everything in it already exited
    AlreadyExited,
    /// The platform has no process-group signals
    Unsupported,
}

/// Ask a process group to terminate (SIGTERM on Unix).
pub fn request_termination(pid: u32) -> SupervisorResult<SignalDelivery> {
    #[cfg(unix)]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Ok(SignalDelivery::Unsupported)
    }
}

/// Force-kill a process group (SIGKILL on Unix).
///
/// `Unsupported` tells the caller to fall back to killing the direct child.
pub fn kill_process_group(pid: u32) -> SupervisorResult<SignalDelivery> {
    #[cfg(unix)]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Ok(SignalDelivery::Unsupported)
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> SupervisorResult<SignalDelivery> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => {
            debug!(pid, signal = %signal, "Signalled process group");
            Ok(SignalDelivery::Delivered)
        }
        Err(Errno::ESRCH) => {
            debug!(pid, signal = %signal, "Process group already gone");
            Ok(SignalDelivery::AlreadyExited)
        }
        Err(e) => Err(SupervisorError::kill_failed(
            pid,
            format!("{} failed: {}", signal, e),
        )),
    }
}
