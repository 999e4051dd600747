//! Stdio routing and status types

use procsup_common::{SupervisorError, SupervisorResult};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// One of the three standard streams of a child
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdin,
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::Stdin => write!(f, "stdin"),
            StreamType::Stdout => write!(f, "stdout"),
            StreamType::Stderr => write!(f, "stderr"),
        }
    }
}

/// Where a single standard stream of the child is connected.
///
/// In YAML the unit variants are plain strings (`pipe`, `inherit`, `null`)
/// and a redirect is a map: `{ file: /var/log/worker.log }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdioRouting {
    /// Share the supervisor's own stream
    Inherit,
    /// Connect to the null device
    Null,
    /// Connect through a pipe owned by the `StdioPipeline`
    Pipe,
    /// Read from (stdin) or append to (stdout/stderr) a file
    #[serde(rename = "file")]
    RedirectToFile(PathBuf),
}

impl StdioRouting {
    pub fn is_pipe(&self) -> bool {
        matches!(self, StdioRouting::Pipe)
    }

    fn to_stdio(&self, stream: StreamType) -> SupervisorResult<Stdio> {
        Ok(match self {
            StdioRouting::Inherit => Stdio::inherit(),
            StdioRouting::Null => Stdio::null(),
            StdioRouting::Pipe => Stdio::piped(),
            StdioRouting::RedirectToFile(path) => Stdio::from(open_redirect(path, stream)?),
        })
    }
}

fn open_redirect(path: &Path, stream: StreamType) -> SupervisorResult<File> {
    let display = path.display().to_string();
    let map_err = |e: std::io::Error| {
        SupervisorError::spawn_failed(
            &display,
            format!("cannot open {} redirect: {}", stream, e),
        )
    };

    match stream {
        StreamType::Stdin => File::open(path).map_err(map_err),
        StreamType::Stdout | StreamType::Stderr => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(map_err)?;
                }
            }
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(map_err)
        }
    }
}

/// Per-stream routing for a launch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StdioConfig {
    #[serde(default = "default_stdin")]
    pub stdin: StdioRouting,
    #[serde(default = "default_output")]
    pub stdout: StdioRouting,
    #[serde(default = "default_output")]
    pub stderr: StdioRouting,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            stdin: default_stdin(),
            stdout: default_output(),
            stderr: default_output(),
        }
    }
}

impl StdioConfig {
    /// All three streams piped
    pub fn piped() -> Self {
        Self {
            stdin: StdioRouting::Pipe,
            stdout: StdioRouting::Pipe,
            stderr: StdioRouting::Pipe,
        }
    }

    /// All three streams shared with the supervisor
    pub fn inherit() -> Self {
        Self {
            stdin: StdioRouting::Inherit,
            stdout: StdioRouting::Inherit,
            stderr: StdioRouting::Inherit,
        }
    }

    pub fn routing(&self, stream: StreamType) -> &StdioRouting {
        match stream {
            StreamType::Stdin => &self.stdin,
            StreamType::Stdout => &self.stdout,
            StreamType::Stderr => &self.stderr,
        }
    }

    /// Wire the routing into `cmd`. Redirect files are opened here and owned
    /// by the command from then on.
    pub fn apply(&self, cmd: &mut Command) -> SupervisorResult<()> {
        cmd.stdin(self.stdin.to_stdio(StreamType::Stdin)?);
        cmd.stdout(self.stdout.to_stdio(StreamType::Stdout)?);
        cmd.stderr(self.stderr.to_stdio(StreamType::Stderr)?);
        Ok(())
    }
}

fn default_stdin() -> StdioRouting {
    StdioRouting::Null
}

fn default_output() -> StdioRouting {
    StdioRouting::Pipe
}

/// Status of one output stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamStatus {
    pub open: bool,
    pub lines_read: u64,
}

/// Snapshot of a pipeline's open flags and counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineStatus {
    pub stdin_open: bool,
    pub stdout: StreamStatus,
    pub stderr: StreamStatus,
}
