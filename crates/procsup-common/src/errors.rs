//! Error taxonomy for process supervision.
//!
//! Pipe errors are normally absorbed by the stdio layer and turned into
//! end-of-stream; spawn and kill errors travel to the caller unchanged.

use std::time::Duration;
use thiserror::Error;

/// Result type for supervisor operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// Supervisor-level error.
///
/// Variants carry owned strings rather than `std::io::Error` so the error can
/// be cloned and fanned out to every task waiting on the same process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// The executable could not be located or launched.
    #[error("Process spawn failed: {command} - {reason}")]
    SpawnFailed { command: String, reason: String },

    /// A read or write observed a closed stream.
    #[error("Pipe broken: {stream} - {reason}")]
    PipeBroken { stream: String, reason: String },

    /// `wait` hit its deadline; the child was force-killed before this was returned.
    #[error("Timeout exceeded waiting for process {pid} after {timeout:?}")]
    TimeoutExceeded { pid: u32, timeout: Duration },

    /// `wait` was cancelled from outside; the child was force-killed.
    #[error("Wait cancelled for process {pid}")]
    Cancelled { pid: u32 },

    /// The kill primitive failed for a reason other than "already exited".
    #[error("Kill failed for process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    /// Illegal lifecycle transition.
    #[error("Invalid state transition for {id}: {from} -> {to}")]
    InvalidState { id: String, from: String, to: String },

    /// Invalid launch specification or configuration.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// The waiter task for a process disappeared before reporting an exit.
    #[error("Exit channel closed unexpectedly for process {pid}")]
    ChannelClosed { pid: u32 },
}

impl SupervisorError {
    pub fn spawn_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn pipe_broken(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PipeBroken {
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout_exceeded(pid: u32, timeout: Duration) -> Self {
        Self::TimeoutExceeded { pid, timeout }
    }

    pub fn cancelled(pid: u32) -> Self {
        Self::Cancelled { pid }
    }

    pub fn kill_failed(pid: u32, reason: impl Into<String>) -> Self {
        Self::KillFailed {
            pid,
            reason: reason.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn channel_closed(pid: u32) -> Self {
        Self::ChannelClosed { pid }
    }
}
