//! The supervisor: start, wait, kill and signal-driven shutdown.

use crate::handle::{CapturedOutput, Control, ExitResult, KillAck, ProcessHandle, WaiterPhase};
use crate::launch::LaunchSpec;
use crate::waiter::Waiter;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use procsup_common::{SupervisorError, SupervisorResult};
use procsup_process::{build_command, process_exists, resolve_executable, SignalDelivery};
use procsup_process_state::LifecycleRecord;
use procsup_signal::{ActionTable, SignalAction, SignalHandler, SignalKind, SignalRelay};
use procsup_stdio::{StdioPipeline, StdioRouting, StreamType};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing and signal settings of a supervisor
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// How long a graceful stop waits after SIGTERM before force-killing
    pub grace_period: Duration,
    /// How long `kill` waits for the killed child to be reaped
    pub kill_confirm_timeout: Duration,
    /// Upper bound on draining output after the child exits
    pub drain_timeout: Duration,
    /// Pending relayed signals; extra deliveries are dropped with a warning
    pub signal_queue_capacity: usize,
    /// What each relayed signal does
    pub actions: ActionTable,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            kill_confirm_timeout: Duration::from_secs(3),
            drain_timeout: Duration::from_secs(5),
            signal_queue_capacity: 8,
            actions: ActionTable::default(),
        }
    }
}

/// Snapshot of supervisor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    pub spawned: u64,
    pub spawn_failures: u64,
    pub kill_invocations: u64,
    pub shutdown_sequences: u64,
}

#[derive(Default)]
struct Counters {
    spawned: AtomicU64,
    spawn_failures: AtomicU64,
    kill_invocations: AtomicU64,
    shutdown_sequences: AtomicU64,
}

/// Supervises any number of child processes.
///
/// Cheap to clone; clones share the same registry, counters and shutdown
/// state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    options: SupervisorOptions,
    registry: RwLock<HashMap<u64, ProcessHandle>>,
    next_key: AtomicU64,
    counters: Counters,
    shutdown_started: AtomicBool,
    shutdown_code: Mutex<Option<i32>>,
    shutdown_done: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        let (shutdown_done, _) = watch::channel(false);
        Self {
            inner: Arc::new(SupervisorInner {
                options,
                registry: RwLock::new(HashMap::new()),
                next_key: AtomicU64::new(0),
                counters: Counters::default(),
                shutdown_started: AtomicBool::new(false),
                shutdown_code: Mutex::new(None),
                shutdown_done,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SupervisorOptions::default())
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.inner.options
    }

    /// A signal relay sharing this supervisor's action table and queue size.
    pub fn signal_relay(&self) -> SignalRelay {
        SignalRelay::new(
            self.inner.options.actions.clone(),
            self.inner.options.signal_queue_capacity,
        )
    }

    /// Spawn a child process.
    ///
    /// Draining tasks for piped output and the waiter task are running by the
    /// time this returns. On failure nothing is left behind to release.
    ///
    /// Refused with `InvalidState` once a signal has started the shutdown
    /// sequence.
    pub fn start(&self, spec: LaunchSpec) -> SupervisorResult<ProcessHandle> {
        let label = spec.display_label();
        if self.is_shutting_down() {
            return Err(self.refuse_start(&label));
        }
        let mut record = LifecycleRecord::new(label.as_str());

        let (mut child, executable) = match self.spawn_child(&spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                let _ = record.mark_failed(e.to_string());
                self.inner.counters.spawn_failures.fetch_add(1, Ordering::Relaxed);
                error!(label = %label, command = %spec.command_line(), "Failed to spawn process: {}", e);
                return Err(e);
            }
        };

        let pid = match child.id() {
            Some(pid) => pid,
            None => {
                let reason = "process exited before its pid could be read";
                let _ = record.mark_failed(reason);
                self.inner.counters.spawn_failures.fetch_add(1, Ordering::Relaxed);
                return Err(SupervisorError::spawn_failed(spec.command_line(), reason));
            }
        };
        record.mark_running(pid)?;

        let (pipeline, drain) = StdioPipeline::attach(label.as_str(), &mut child);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(WaiterPhase::Running);

        let handle = ProcessHandle::new(
            pid,
            label,
            executable,
            spec.args.clone(),
            record,
            pipeline,
            control_tx,
            phase_rx,
        );

        Waiter {
            handle: handle.clone(),
            child,
            drain,
            control_rx,
            phase_tx,
            drain_timeout: self.inner.options.drain_timeout,
        }
        .spawn();

        {
            // The shutdown snapshot takes the registry lock after the flag is
            // set, so a handle inserted under the lock with the flag clear is
            // always stopped by it.
            let mut registry = self.inner.registry.write();
            if self.is_shutting_down() {
                drop(registry);
                let (ack, _) = oneshot::channel();
                let _ = handle.send_control(Control::Kill {
                    reason: "started during shutdown".to_string(),
                    ack,
                });
                return Err(self.refuse_start(handle.label()));
            }
            let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
            registry.insert(key, handle.clone());
        }
        self.inner.counters.spawned.fetch_add(1, Ordering::Relaxed);

        info!(
            pid,
            label = %handle.label(),
            command = %spec.command_line(),
            "Process started"
        );

        Ok(handle)
    }

    fn refuse_start(&self, label: &str) -> SupervisorError {
        warn!(label = %label, "Shutdown in progress, refusing to start process");
        SupervisorError::invalid_state(label, "shutting down", "running")
    }

    fn spawn_child(&self, spec: &LaunchSpec) -> SupervisorResult<(tokio::process::Child, String)> {
        let executable = resolve_executable(
            &spec.executable,
            spec.working_directory.as_deref(),
            &spec.environment,
        )?;

        let mut cmd = build_command(
            &executable,
            &spec.args,
            spec.working_directory.as_deref(),
            &spec.environment,
        );
        spec.stdio.apply(&mut cmd)?;

        let command = executable.display().to_string();
        let child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn_failed(&command, e.to_string()))?;

        Ok((child, command))
    }

    /// Wait for `handle` to terminate.
    ///
    /// `None` or a zero timeout waits indefinitely. When the timeout elapses
    /// the child is force-killed and reaped before `TimeoutExceeded` is
    /// returned.
    pub async fn wait(
        &self,
        handle: &ProcessHandle,
        timeout: Option<Duration>,
    ) -> SupervisorResult<ExitResult> {
        self.wait_inner(handle, timeout, None).await
    }

    /// `wait` that can also be cancelled from outside. Cancellation kills the
    /// child the same way a timeout does and reports `Cancelled`.
    pub async fn wait_with_cancel(
        &self,
        handle: &ProcessHandle,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> SupervisorResult<ExitResult> {
        self.wait_inner(handle, timeout, Some(cancel)).await
    }

    async fn wait_inner(
        &self,
        handle: &ProcessHandle,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> SupervisorResult<ExitResult> {
        enum Outcome {
            Reported(SupervisorResult<ExitResult>),
            TimedOut(Duration),
            Cancelled,
        }

        let deadline = timeout.filter(|t| !t.is_zero());
        let expired = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            result = handle.reported() => Outcome::Reported(result),
            _ = expired => Outcome::TimedOut(deadline.unwrap_or_default()),
            _ = cancelled => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Reported(result) => result,
            Outcome::TimedOut(limit) => {
                warn!(pid = handle.pid(), label = %handle.label(), timeout = ?limit, "Wait timed out, killing process");
                self.force_kill(handle, format!("wait timed out after {:?}", limit))
                    .await?;
                handle.reported().await?;
                Err(SupervisorError::timeout_exceeded(handle.pid(), limit))
            }
            Outcome::Cancelled => {
                info!(pid = handle.pid(), label = %handle.label(), "Wait cancelled, killing process");
                self.force_kill(handle, "wait cancelled").await?;
                handle.reported().await?;
                Err(SupervisorError::cancelled(handle.pid()))
            }
        }
    }

    /// Force-kill `handle`. A terminal handle is left alone.
    pub async fn kill(&self, handle: &ProcessHandle) -> SupervisorResult<KillAck> {
        self.force_kill(handle, "kill requested").await
    }

    async fn force_kill(
        &self,
        handle: &ProcessHandle,
        reason: impl Into<String>,
    ) -> SupervisorResult<KillAck> {
        self.inner.counters.kill_invocations.fetch_add(1, Ordering::Relaxed);
        let pid = handle.pid();

        if handle.is_terminal() {
            debug!(pid, state = %handle.state(), "Kill skipped, process already terminal");
            return Ok(KillAck::AlreadyTerminal);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = handle.send_control(Control::Kill {
            reason: reason.into(),
            ack: ack_tx,
        });
        let ack = match sent {
            Ok(()) => match ack_rx.await {
                Ok(result) => result?,
                Err(_) => return Self::waiter_gone(handle),
            },
            Err(_) => return Self::waiter_gone(handle),
        };

        if ack == KillAck::Killed {
            info!(pid, label = %handle.label(), "Process killed");
            self.confirm_exit(handle).await?;
        }
        Ok(ack)
    }

    fn waiter_gone(handle: &ProcessHandle) -> SupervisorResult<KillAck> {
        if handle.is_terminal() {
            Ok(KillAck::AlreadyTerminal)
        } else {
            Err(SupervisorError::channel_closed(handle.pid()))
        }
    }

    /// Wait for the waiter to reap a killed child, falling back to an
    /// existence check when it takes longer than `kill_confirm_timeout`.
    async fn confirm_exit(&self, handle: &ProcessHandle) -> SupervisorResult<()> {
        let timeout = self.inner.options.kill_confirm_timeout;
        if handle.reaped_within(timeout).await {
            return Ok(());
        }

        let pid = handle.pid();
        match process_exists(pid) {
            Ok(false) => {
                debug!(pid, "Process gone although not yet reaped");
                Ok(())
            }
            Ok(true) => Err(SupervisorError::kill_failed(
                pid,
                format!("process still present {:?} after SIGKILL", timeout),
            )),
            Err(e) => {
                warn!(pid, "Could not confirm process exit: {}", e);
                Ok(())
            }
        }
    }

    /// Ask the child to exit with SIGTERM. Routed through the waiter so the
    /// signal never targets a reaped pid.
    async fn request_terminate(&self, handle: &ProcessHandle) -> SupervisorResult<SignalDelivery> {
        if handle.is_terminal() {
            return Ok(SignalDelivery::AlreadyExited);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if handle.send_control(Control::Terminate { ack: ack_tx }).is_err() {
            return Ok(SignalDelivery::AlreadyExited);
        }
        ack_rx.await.unwrap_or(Ok(SignalDelivery::AlreadyExited))
    }

    /// React to a relayed signal.
    ///
    /// The first recognized stop signal records its exit code and starts the
    /// shutdown sequence in the background; every later one is ignored.
    /// Returns `true` if this call started the shutdown.
    pub fn handle_signal(&self, kind: SignalKind) -> bool {
        let action = self.inner.options.actions.lookup(kind);
        let Some(exit_code) = action.exit_code() else {
            debug!(signal = %kind, "No action for signal");
            return false;
        };

        if self.inner.shutdown_started.swap(true, Ordering::SeqCst) {
            info!(signal = %kind, "Shutdown already in progress, ignoring signal");
            return false;
        }
        *self.inner.shutdown_code.lock() = Some(exit_code);

        info!(signal = %kind, action = ?action, exit_code, "Starting shutdown sequence");

        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.shutdown_all(action).await;
            supervisor.inner.shutdown_done.send_replace(true);
        });
        true
    }

    /// Stop every non-terminal process concurrently.
    ///
    /// `GracefulStop` sends SIGTERM and force-kills whatever is still running
    /// after the grace period; `ImmediateStop` force-kills right away.
    pub async fn shutdown_all(&self, action: SignalAction) {
        if !action.is_stop() {
            return;
        }
        self.inner.counters.shutdown_sequences.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<ProcessHandle> = self
            .processes()
            .into_iter()
            .filter(|h| !h.is_terminal())
            .collect();
        info!(processes = targets.len(), action = ?action, "Stopping processes");

        let results = join_all(targets.iter().map(|h| self.stop_process(h, action))).await;
        for (handle, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                error!(pid = handle.pid(), label = %handle.label(), "Failed to stop process: {}", e);
            }
        }

        info!("Shutdown sequence finished");
    }

    async fn stop_process(&self, handle: &ProcessHandle, action: SignalAction) -> SupervisorResult<()> {
        if let SignalAction::GracefulStop { .. } = action {
            match self.request_terminate(handle).await {
                Ok(SignalDelivery::Delivered) => {
                    let grace = self.inner.options.grace_period;
                    if handle.reaped_within(grace).await {
                        debug!(pid = handle.pid(), "Process exited within grace period");
                        return Ok(());
                    }
                    warn!(pid = handle.pid(), grace_period = ?grace, "Grace period expired, force killing");
                }
                Ok(SignalDelivery::AlreadyExited) => return Ok(()),
                Ok(SignalDelivery::Unsupported) => {}
                Err(e) => warn!(pid = handle.pid(), "SIGTERM failed, force killing: {}", e),
            }
            return self.force_kill(handle, "grace period expired").await.map(|_| ());
        }

        self.force_kill(handle, "immediate stop").await.map(|_| ())
    }

    /// Exit code recorded by the signal that started the shutdown.
    pub fn shutdown_exit_code(&self) -> Option<i32> {
        *self.inner.shutdown_code.lock()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown_started.load(Ordering::SeqCst)
    }

    /// Completes once a signal-triggered shutdown sequence has finished.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.inner.shutdown_done.subscribe();
        // The sender lives in `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Run `spec` to completion and collect everything it writes.
    ///
    /// Stdout and stderr are forced to `Pipe`; a piped stdin is closed right
    /// after the spawn.
    pub async fn output(
        &self,
        mut spec: LaunchSpec,
        timeout: Option<Duration>,
    ) -> SupervisorResult<CapturedOutput> {
        spec.stdio.stdout = StdioRouting::Pipe;
        spec.stdio.stderr = StdioRouting::Pipe;

        let handle = self.start(spec)?;
        handle.stdio().close_stdin().await;

        let stdout = handle.stdio().read_lines(StreamType::Stdout);
        let stderr = handle.stdio().read_lines(StreamType::Stderr);
        let (exit, stdout, stderr) = tokio::join!(
            self.wait(&handle, timeout),
            stdout.collect_lines(),
            stderr.collect_lines()
        );

        Ok(CapturedOutput {
            exit: exit?,
            stdout,
            stderr,
        })
    }

    pub fn stats(&self) -> SupervisorStats {
        let counters = &self.inner.counters;
        SupervisorStats {
            spawned: counters.spawned.load(Ordering::Relaxed),
            spawn_failures: counters.spawn_failures.load(Ordering::Relaxed),
            kill_invocations: counters.kill_invocations.load(Ordering::Relaxed),
            shutdown_sequences: counters.shutdown_sequences.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of every supervised handle, in start order.
    pub fn processes(&self) -> Vec<ProcessHandle> {
        let registry = self.inner.registry.read();
        let mut entries: Vec<_> = registry.iter().collect();
        entries.sort_by_key(|(key, _)| **key);
        entries.into_iter().map(|(_, h)| h.clone()).collect()
    }

    /// Drop finished handles from the registry. Returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut registry = self.inner.registry.write();
        let before = registry.len();
        registry.retain(|_, handle| !handle.is_finished());
        before - registry.len()
    }
}

#[async_trait]
impl SignalHandler for Supervisor {
    async fn handle_signal(&self, kind: SignalKind) {
        Supervisor::handle_signal(self, kind);
    }
}
