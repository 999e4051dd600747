//! Process existence checking.

use procsup_common::{SupervisorError, SupervisorResult};

/// Check if a process with the given PID exists.
///
/// On Unix this is `kill(pid, 0)`: no signal is sent, only the existence
/// and permission checks run. A zombie still counts as existing until it is
/// reaped.
///
/// * `Ok(true)` - process exists
/// * `Ok(false)` - process does not exist
/// * `Err(_)` - the check itself failed
pub fn process_exists(pid: u32) -> SupervisorResult<bool> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(_) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            // Exists, but owned by someone else
            Err(Errno::EPERM) => Ok(true),
            Err(e) => Err(SupervisorError::configuration(format!(
                "Failed to check process {}: {}",
                pid, e
            ))),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(SupervisorError::configuration(
            "process existence checks are only supported on Unix",
        ))
    }
}
