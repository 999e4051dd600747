//! Command construction and exit-status decoding.

use std::collections::HashMap;
use std::path::Path;
use std::process::ExitStatus;
use tokio::process::Command;

/// Build a command for `executable` with `args`, an optional working
/// directory and environment overrides layered over the inherited
/// environment.
///
/// On Unix the child leads a new process group, so group signals also reach
/// whatever it spawns. Stdio routing is left to the caller.
pub fn build_command(
    executable: &Path,
    args: &[String],
    working_directory: Option<&Path>,
    environment: &HashMap<String, String>,
) -> Command {
    let mut cmd = Command::new(executable);
    cmd.args(args);

    if let Some(wd) = working_directory {
        cmd.current_dir(wd);
    }

    for (key, value) in environment {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    // The waiter task owns reaping; this only guards against a dropped handle.
    cmd.kill_on_drop(true);

    cmd
}

/// Decoded exit status: numeric code plus the terminating signal, if any.
///
/// A signal-terminated child reports `128 + signal` as its code, the shell
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedExit {
    pub code: i32,
    pub signal: Option<i32>,
}

pub fn decode_exit_status(status: ExitStatus) -> DecodedExit {
    if let Some(code) = status.code() {
        return DecodedExit { code, signal: None };
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return DecodedExit {
                code: 128 + signal,
                signal: Some(signal),
            };
        }
    }

    DecodedExit {
        code: -1,
        signal: None,
    }
}
