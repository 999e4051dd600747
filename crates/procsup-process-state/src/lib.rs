use chrono::{DateTime, Utc};
use procsup_common::{SupervisorError, SupervisorResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of transitions kept in a record's history.
const MAX_HISTORY: usize = 100;

/// Lifecycle state of one supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Launch requested, not yet spawned
    Created,
    /// Spawned and not yet observed to terminate
    Running,
    /// Terminated on its own; an exit code is available
    Exited,
    /// Terminated by the supervisor (explicit kill, timeout or shutdown)
    Killed,
    /// Never reached `Running` because the spawn failed
    Failed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Created => write!(f, "created"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited => write!(f, "exited"),
            ProcessState::Killed => write!(f, "killed"),
            ProcessState::Failed => write!(f, "failed"),
        }
    }
}

impl ProcessState {
    /// Terminal states are final and mutually exclusive.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessState::Exited | ProcessState::Killed | ProcessState::Failed
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

/// A state transition with timestamp and optional reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ProcessState,
    pub to_state: ProcessState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Lifecycle record of one process: current state, exit code, timestamps and
/// a bounded transition history.
///
/// Terminal commits are first-writer-wins: once the record is terminal every
/// further `commit_*` call returns `false` and leaves the record untouched.
#[derive(Debug, Clone)]
pub struct LifecycleRecord {
    label: String,
    pid: Option<u32>,
    current_state: ProcessState,
    exit_code: Option<i32>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    history: Vec<StateTransition>,
}

impl LifecycleRecord {
    /// Create a record in the `Created` state
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pid: None,
            current_state: ProcessState::Created,
            exit_code: None,
            started_at: None,
            ended_at: None,
            history: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn current_state(&self) -> ProcessState {
        self.current_state
    }

    /// Exit code, present only when the state is `Exited`.
    pub fn exit_code(&self) -> Option<i32> {
        match self.current_state {
            ProcessState::Exited => self.exit_code,
            _ => None,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Check whether moving from the current state to `target` is legal.
    pub fn is_valid_transition(&self, target: ProcessState) -> bool {
        matches!(
            (self.current_state, target),
            (ProcessState::Created, ProcessState::Running)
                | (ProcessState::Created, ProcessState::Failed)
                | (ProcessState::Running, ProcessState::Exited)
                | (ProcessState::Running, ProcessState::Killed)
        )
    }

    /// Transition to `target`, rejecting illegal moves.
    pub fn transition_to(
        &mut self,
        target: ProcessState,
        reason: Option<String>,
    ) -> SupervisorResult<()> {
        if !self.is_valid_transition(target) {
            return Err(SupervisorError::invalid_state(
                &self.label,
                self.current_state.to_string(),
                target.to_string(),
            ));
        }

        let now = Utc::now();
        let from = self.current_state;
        self.history.push(StateTransition {
            from_state: from,
            to_state: target,
            timestamp: now,
            reason,
        });
        if self.history.len() > MAX_HISTORY {
            self.history.remove(0);
        }

        self.current_state = target;
        match target {
            ProcessState::Running => self.started_at = Some(now),
            state if state.is_terminal() => self.ended_at = Some(now),
            _ => {}
        }

        tracing::debug!(
            "Process {} transitioned from {} to {}",
            self.label,
            from,
            target
        );

        Ok(())
    }

    /// `Created -> Running` once the OS assigned a pid.
    pub fn mark_running(&mut self, pid: u32) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Running, Some(format!("spawned with pid {}", pid)))?;
        self.pid = Some(pid);
        Ok(())
    }

    /// `Created -> Failed` after a spawn error.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Failed, Some(reason.into()))
    }

    /// Commit a natural exit. Returns `false` if another writer got there first.
    pub fn commit_exited(&mut self, exit_code: i32) -> bool {
        if !self.can_commit(ProcessState::Exited) {
            return false;
        }
        self.exit_code = Some(exit_code);
        self.transition_to(
            ProcessState::Exited,
            Some(format!("exited with code {}", exit_code)),
        )
        .is_ok()
    }

    /// Commit a forced termination. Returns `false` if another writer got there first.
    pub fn commit_killed(&mut self, reason: impl Into<String>) -> bool {
        if !self.can_commit(ProcessState::Killed) {
            return false;
        }
        self.transition_to(ProcessState::Killed, Some(reason.into()))
            .is_ok()
    }

    fn can_commit(&self, target: ProcessState) -> bool {
        if self.current_state.is_terminal() {
            tracing::debug!(
                "Process {} already {}, ignoring {} commit",
                self.label,
                self.current_state,
                target
            );
            return false;
        }
        self.is_valid_transition(target)
    }
}
