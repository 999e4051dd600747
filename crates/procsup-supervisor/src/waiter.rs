//! Waiter task: one per process, sole owner of the OS child handle.
//!
//! Serves kill and terminate requests while the child runs, reaps it,
//! commits the natural exit (unless a kill got there first), joins the
//! draining tasks and only then publishes the exit result.

use crate::handle::{Control, ExitResult, KillAck, ProcessHandle, WaiterPhase};
use procsup_common::SupervisorError;
use procsup_process::{
    decode_exit_status, kill_process_group, request_termination, DecodedExit, SignalDelivery,
};
use procsup_process_state::ProcessState;
use procsup_stdio::DrainTasks;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

pub(crate) struct Waiter {
    pub handle: ProcessHandle,
    pub child: Child,
    pub drain: DrainTasks,
    pub control_rx: mpsc::UnboundedReceiver<Control>,
    pub phase_tx: watch::Sender<WaiterPhase>,
    pub drain_timeout: Duration,
}

impl Waiter {
    pub fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(mut self) {
        let pid = self.handle.pid();

        let status = loop {
            tokio::select! {
                biased;

                Some(control) = self.control_rx.recv() => {
                    if let Some(status) = self.serve(control) {
                        break status;
                    }
                }

                status = self.child.wait() => {
                    break status;
                }
            }
        };

        let decoded = match status {
            Ok(status) => decode_exit_status(status),
            Err(e) => {
                error!(pid, label = %self.handle.label(), "Failed to wait for process: {}", e);
                DecodedExit {
                    code: -1,
                    signal: None,
                }
            }
        };

        let state = {
            let mut record = self.handle.record();
            record.commit_exited(decoded.code);
            record.current_state()
        };

        match state {
            ProcessState::Exited => info!(
                pid,
                label = %self.handle.label(),
                code = decoded.code,
                "Process exited"
            ),
            _ => info!(
                pid,
                label = %self.handle.label(),
                code = decoded.code,
                signal = ?decoded.signal,
                "Process terminated by supervisor"
            ),
        }

        // Late requests find a reaped child; answer them without touching the pid.
        self.control_rx.close();
        while let Some(control) = self.control_rx.recv().await {
            reject_after_exit(control);
        }
        self.handle.stdio().mark_child_exited();
        self.phase_tx.send_replace(WaiterPhase::Reaped);

        let stream_count = self.drain.len();
        if !self.drain.join(self.drain_timeout).await {
            warn!(
                pid,
                label = %self.handle.label(),
                drain_timeout = ?self.drain_timeout,
                "Output did not reach end-of-stream in time, abandoning readers"
            );
        } else {
            debug!(pid, streams = stream_count, "Output drained");
        }

        let result = ExitResult {
            pid,
            state,
            code: decoded.code,
            signal: decoded.signal,
            duration: self.handle.spawned_at().elapsed(),
        };
        self.phase_tx.send_replace(WaiterPhase::Reported(result));
    }

    /// Answer one control request. Returns the exit status when the child
    /// turned out to have exited already, so the caller can go straight to
    /// the reap path.
    fn serve(&mut self, control: Control) -> Option<std::io::Result<ExitStatus>> {
        let pid = self.handle.pid();

        // A child that exited but is not reaped yet must not be reported as
        // killed, and its pid must not be signalled.
        let exited = match self.child.try_wait() {
            Ok(Some(status)) => {
                let decoded = decode_exit_status(status);
                self.handle.record().commit_exited(decoded.code);
                debug!(pid, code = decoded.code, "Control request raced a natural exit");
                Some(Ok(status))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        };
        if exited.is_some() {
            reject_after_exit(control);
            return exited;
        }

        match control {
            Control::Kill { reason, ack } => {
                let _ = ack.send(self.kill(reason));
            }
            Control::Terminate { ack } => {
                let _ = ack.send(request_termination(pid));
            }
        }
        None
    }

    fn kill(&mut self, reason: String) -> Result<KillAck, SupervisorError> {
        let pid = self.handle.pid();

        match kill_process_group(pid)? {
            SignalDelivery::Delivered => {}
            SignalDelivery::AlreadyExited | SignalDelivery::Unsupported => {
                match self.child.start_kill() {
                    Ok(()) => {}
                    // tokio reports an already-reaped child as InvalidInput
                    Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                        return Ok(KillAck::AlreadyTerminal);
                    }
                    Err(e) => return Err(SupervisorError::kill_failed(pid, e.to_string())),
                }
            }
        }

        if self.handle.record().commit_killed(reason.as_str()) {
            debug!(pid, reason = %reason, "Sent SIGKILL");
            Ok(KillAck::Killed)
        } else {
            Ok(KillAck::AlreadyTerminal)
        }
    }
}

fn reject_after_exit(control: Control) {
    match control {
        Control::Kill { ack, .. } => {
            let _ = ack.send(Ok(KillAck::AlreadyTerminal));
        }
        Control::Terminate { ack } => {
            let _ = ack.send(Ok(SignalDelivery::AlreadyExited));
        }
    }
}
