//! # procsup supervisor
//!
//! Starts child processes, waits for them with timeout and forced-kill
//! fallback, and turns relayed OS signals into a single shutdown sequence.
//!
//! ```no_run
//! use procsup_supervisor::{LaunchSpec, Supervisor};
//! use std::time::Duration;
//!
//! # async fn demo() -> procsup_common::SupervisorResult<()> {
//! let supervisor = Supervisor::with_defaults();
//! let handle = supervisor.start(LaunchSpec::new("echo").arg("hello"))?;
//! let result = supervisor.wait(&handle, Some(Duration::from_secs(5))).await?;
//! assert_eq!(result.code, 0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod handle;
pub mod launch;
pub mod supervisor;
mod waiter;

pub use config::{ProcessConfig, SupervisorConfig, SupervisorSettings};
pub use handle::{CapturedOutput, ExitResult, KillAck, ProcessHandle};
pub use launch::LaunchSpec;
pub use supervisor::{Supervisor, SupervisorOptions, SupervisorStats};

// Re-exported so callers need a single dependency.
pub use procsup_common::{SupervisorError, SupervisorResult};
pub use procsup_process_state::{ProcessState, StateTransition};
pub use procsup_signal::{ActionTable, SignalAction, SignalKind};
pub use procsup_stdio::{LineStream, StdioConfig, StdioPipeline, StdioRouting, StreamType};
