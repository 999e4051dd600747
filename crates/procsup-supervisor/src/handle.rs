//! Process handles and exit reporting

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use procsup_common::{SupervisorError, SupervisorResult};
use procsup_process::SignalDelivery;
use procsup_process_state::{LifecycleRecord, ProcessState, StateTransition};
use procsup_stdio::StdioPipeline;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};

/// Outcome of a terminated process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitResult {
    pub pid: u32,
    /// `Exited` or `Killed`
    pub state: ProcessState,
    /// Numeric exit status; `128 + signal` if a signal ended the child
    pub code: i32,
    pub signal: Option<i32>,
    /// Time from spawn to reap
    pub duration: Duration,
}

impl ExitResult {
    pub fn success(&self) -> bool {
        self.state == ProcessState::Exited && self.code == 0
    }
}

/// Successful outcome of a kill request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KillAck {
    /// The child was force-killed and the handle committed `Killed`
    Killed,
    /// The handle was already terminal; nothing was done
    AlreadyTerminal,
}

/// Exit result plus everything the child wrote to stdout and stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedOutput {
    pub exit: ExitResult,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Requests served by the waiter task, which owns the OS child handle.
pub(crate) enum Control {
    Kill {
        reason: String,
        ack: oneshot::Sender<SupervisorResult<KillAck>>,
    },
    Terminate {
        ack: oneshot::Sender<SupervisorResult<SignalDelivery>>,
    },
}

/// Progress of the waiter task, published on a watch channel.
#[derive(Debug, Clone)]
pub(crate) enum WaiterPhase {
    Running,
    /// Child reaped, output still draining
    Reaped,
    Reported(ExitResult),
}

/// Handle to one spawned process.
///
/// Cheap to clone. Exposes identity, lifecycle state and the stdio pipeline;
/// all state transitions are made by the supervisor and the waiter task.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    pid: u32,
    label: String,
    command: String,
    args: Vec<String>,
    spawned_at: Instant,
    record: Mutex<LifecycleRecord>,
    pipeline: StdioPipeline,
    control_tx: mpsc::UnboundedSender<Control>,
    phase_rx: watch::Receiver<WaiterPhase>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.inner.pid)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}

impl ProcessHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pid: u32,
        label: String,
        command: String,
        args: Vec<String>,
        record: LifecycleRecord,
        pipeline: StdioPipeline,
        control_tx: mpsc::UnboundedSender<Control>,
        phase_rx: watch::Receiver<WaiterPhase>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                pid,
                label,
                command,
                args,
                spawned_at: Instant::now(),
                record: Mutex::new(record),
                pipeline,
                control_tx,
                phase_rx,
            }),
        }
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Resolved executable path
    pub fn command(&self) -> &str {
        &self.inner.command
    }

    pub fn args(&self) -> &[String] {
        &self.inner.args
    }

    pub fn state(&self) -> ProcessState {
        self.inner.record.lock().current_state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Exit code, only once the process `Exited` on its own.
    pub fn exit_code(&self) -> Option<i32> {
        self.inner.record.lock().exit_code()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.record.lock().started_at()
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.inner.record.lock().ended_at()
    }

    pub fn history(&self) -> Vec<StateTransition> {
        self.inner.record.lock().history().to_vec()
    }

    pub fn stdio(&self) -> &StdioPipeline {
        &self.inner.pipeline
    }

    /// The published exit result, if the waiter has reported one.
    pub fn exit_result(&self) -> Option<ExitResult> {
        match &*self.inner.phase_rx.borrow() {
            WaiterPhase::Reported(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Terminal and every stream closed: nothing left to release.
    pub fn is_finished(&self) -> bool {
        self.is_terminal() && self.inner.pipeline.is_fully_closed()
    }

    pub(crate) fn record(&self) -> MutexGuard<'_, LifecycleRecord> {
        self.inner.record.lock()
    }

    pub(crate) fn spawned_at(&self) -> Instant {
        self.inner.spawned_at
    }

    pub(crate) fn send_control(&self, control: Control) -> SupervisorResult<()> {
        self.inner
            .control_tx
            .send(control)
            .map_err(|_| SupervisorError::channel_closed(self.inner.pid))
    }

    pub(crate) fn phase(&self) -> watch::Receiver<WaiterPhase> {
        self.inner.phase_rx.clone()
    }

    /// Wait until the waiter publishes the exit result.
    pub(crate) async fn reported(&self) -> SupervisorResult<ExitResult> {
        let mut rx = self.phase();
        loop {
            if let WaiterPhase::Reported(result) = &*rx.borrow_and_update() {
                return Ok(result.clone());
            }
            if rx.changed().await.is_err() {
                // Sender gone; the last value is still readable.
                return match &*rx.borrow() {
                    WaiterPhase::Reported(result) => Ok(result.clone()),
                    _ => Err(SupervisorError::channel_closed(self.inner.pid)),
                };
            }
        }
    }

    /// Wait until the child has been reaped, or `timeout` elapses.
    /// Returns `true` if the child was reaped in time.
    pub(crate) async fn reaped_within(&self, timeout: Duration) -> bool {
        let mut rx = self.phase();
        let reaped = async move {
            loop {
                if !matches!(*rx.borrow_and_update(), WaiterPhase::Running) {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return !matches!(*rx.borrow(), WaiterPhase::Running);
                }
            }
        };
        tokio::time::timeout(timeout, reaped).await.unwrap_or(false)
    }
}
