//! The stdio pipeline of one child process.
//!
//! Output streams are drained by background tasks spawned in `attach`, i.e.
//! before the caller gets a chance to wait on the child. Lines land in
//! unbounded per-stream queues, so a slow or absent consumer never stalls
//! the child on a full OS pipe buffer.

use crate::types::{PipelineStatus, StreamStatus, StreamType};
use futures::Stream;
use procsup_common::{SupervisorError, SupervisorResult};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Stdin, stdout and stderr connections to one child.
///
/// Every open flag flips to `false` exactly once. Streams that were not
/// routed through a pipe start closed.
pub struct StdioPipeline {
    label: String,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    stdin_open: AtomicBool,
    child_exited: AtomicBool,
    stdout: OutputChannel,
    stderr: OutputChannel,
}

impl std::fmt::Debug for StdioPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioPipeline")
            .field("label", &self.label)
            .field("status", &self.status())
            .finish()
    }
}

impl StdioPipeline {
    /// Take the piped streams out of `child` and start draining its output.
    ///
    /// Returns the pipeline and the draining tasks; the latter form the
    /// drain-before-report barrier the waiter joins once the child exits.
    pub fn attach(label: impl Into<String>, child: &mut Child) -> (Self, DrainTasks) {
        let label = label.into();
        let mut tasks = Vec::new();

        let stdin = child.stdin.take();
        let stdin_open = AtomicBool::new(stdin.is_some());

        let stdout = match child.stdout.take() {
            Some(stream) => {
                let (channel, task) = OutputChannel::drain(&label, StreamType::Stdout, stream);
                tasks.push(task);
                channel
            }
            None => OutputChannel::closed(),
        };

        let stderr = match child.stderr.take() {
            Some(stream) => {
                let (channel, task) = OutputChannel::drain(&label, StreamType::Stderr, stream);
                tasks.push(task);
                channel
            }
            None => OutputChannel::closed(),
        };

        debug!(
            label = %label,
            drain_tasks = tasks.len(),
            "Stdio pipeline attached"
        );

        let pipeline = Self {
            label,
            stdin: tokio::sync::Mutex::new(stdin),
            stdin_open,
            child_exited: AtomicBool::new(false),
            stdout,
            stderr,
        };

        (pipeline, DrainTasks { tasks })
    }

    /// Write `text` followed by a newline to the child's stdin.
    ///
    /// Suspends while the OS pipe buffer is full. Fails with `PipeBroken` if
    /// stdin is closed, the child exited, or the write hits a closed pipe; in
    /// the last case stdin is released and marked closed.
    pub async fn write_line(&self, text: &str) -> SupervisorResult<()> {
        if self.child_exited.load(Ordering::SeqCst) {
            return Err(SupervisorError::pipe_broken(
                StreamType::Stdin.to_string(),
                "child has exited",
            ));
        }

        let mut guard = self.stdin.lock().await;
        let stdin = match guard.as_mut() {
            Some(stdin) => stdin,
            None => {
                return Err(SupervisorError::pipe_broken(
                    StreamType::Stdin.to_string(),
                    "stdin is closed",
                ))
            }
        };

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let result: std::io::Result<()> = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = result {
            *guard = None;
            self.flip_stdin_closed();
            warn!(label = %self.label, error = %e, "Write to child stdin failed");
            return Err(SupervisorError::pipe_broken(
                StreamType::Stdin.to_string(),
                e.to_string(),
            ));
        }

        Ok(())
    }

    /// Signal end-of-input to the child. Repeated calls are no-ops.
    pub async fn close_stdin(&self) {
        let stdin = self.stdin.lock().await.take();
        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.shutdown().await {
                debug!(label = %self.label, error = %e, "Stdin shutdown reported an error");
            }
        }
        self.flip_stdin_closed();
    }

    /// Lazily yield the lines of an output stream in the order the child
    /// wrote them.
    ///
    /// The sequence ends when the child closes the stream or exits. It can
    /// be taken once; later calls, and calls for unpiped streams or stdin,
    /// yield an empty sequence.
    pub fn read_lines(&self, stream: StreamType) -> LineStream {
        let receiver = match stream {
            StreamType::Stdout => self.stdout.receiver.lock().take(),
            StreamType::Stderr => self.stderr.receiver.lock().take(),
            StreamType::Stdin => None,
        };
        LineStream { stream, receiver }
    }

    pub fn is_open(&self, stream: StreamType) -> bool {
        match stream {
            StreamType::Stdin => self.stdin_open.load(Ordering::SeqCst),
            StreamType::Stdout => self.stdout.open.load(Ordering::SeqCst),
            StreamType::Stderr => self.stderr.open.load(Ordering::SeqCst),
        }
    }

    /// True once every stream is closed.
    pub fn is_fully_closed(&self) -> bool {
        !self.is_open(StreamType::Stdin)
            && !self.is_open(StreamType::Stdout)
            && !self.is_open(StreamType::Stderr)
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            stdin_open: self.is_open(StreamType::Stdin),
            stdout: self.stdout.status(),
            stderr: self.stderr.status(),
        }
    }

    /// Called by the waiter once the child is reaped: later writes report
    /// `PipeBroken` and the stdin handle is released.
    ///
    /// Never waits on the stdin lock. A writer still holding it releases the
    /// handle itself when its write fails.
    pub fn mark_child_exited(&self) {
        self.child_exited.store(true, Ordering::SeqCst);
        match self.stdin.try_lock() {
            Ok(mut guard) => {
                guard.take();
                self.flip_stdin_closed();
            }
            Err(_) => debug!(label = %self.label, "Stdin busy at exit, left to the writer"),
        }
    }

    fn flip_stdin_closed(&self) {
        if self
            .stdin_open
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!(label = %self.label, "Stdin closed");
        }
    }
}

/// Queue and bookkeeping for one drained output stream
struct OutputChannel {
    open: Arc<AtomicBool>,
    lines_read: Arc<AtomicU64>,
    receiver: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl OutputChannel {
    fn closed() -> Self {
        Self {
            open: Arc::new(AtomicBool::new(false)),
            lines_read: Arc::new(AtomicU64::new(0)),
            receiver: parking_lot::Mutex::new(None),
        }
    }

    fn drain(
        label: &str,
        stream_type: StreamType,
        stream: impl AsyncRead + Unpin + Send + 'static,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let lines_read = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(stream_reader(
            stream,
            stream_type,
            label.to_string(),
            tx,
            OpenFlagGuard(Arc::clone(&open)),
            Arc::clone(&lines_read),
        ));

        let channel = Self {
            open,
            lines_read,
            receiver: parking_lot::Mutex::new(Some(rx)),
        };
        (channel, task)
    }

    fn status(&self) -> StreamStatus {
        StreamStatus {
            open: self.open.load(Ordering::SeqCst),
            lines_read: self.lines_read.load(Ordering::SeqCst),
        }
    }
}

/// Flips a stream's open flag when the reader finishes, is aborted or panics.
struct OpenFlagGuard(Arc<AtomicBool>);

impl Drop for OpenFlagGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn stream_reader(
    stream: impl AsyncRead + Unpin,
    stream_type: StreamType,
    label: String,
    tx: mpsc::UnboundedSender<String>,
    _open: OpenFlagGuard,
    lines_read: Arc<AtomicU64>,
) {
    debug!("stream_reader started for {} ({})", label, stream_type);
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!(label = %label, stream = %stream_type, "Stream ended");
                break;
            }
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                lines_read.fetch_add(1, Ordering::SeqCst);
                // Keep draining even if nobody listens, or the child could block.
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
            }
            Err(e) => {
                // Absorbed: a broken pipe is end-of-stream, not a supervisor failure.
                warn!(
                    label = %label,
                    stream = %stream_type,
                    error = %e,
                    "Pipe broken while reading, treating as end of stream"
                );
                break;
            }
        }
    }

    debug!(
        label = %label,
        stream = %stream_type,
        lines = lines_read.load(Ordering::SeqCst),
        "Stream reader finished"
    );
}

/// Draining tasks of one pipeline
#[derive(Debug)]
pub struct DrainTasks {
    tasks: Vec<JoinHandle<()>>,
}

impl DrainTasks {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every reader to hit end-of-stream, up to `timeout`.
    ///
    /// Readers still running at the deadline (typically because a grandchild
    /// inherited the pipe) are aborted. Returns `true` if everything drained.
    pub async fn join(self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut drained = true;

        for mut task in self.tasks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(_) => {}
                Err(_) => {
                    task.abort();
                    drained = false;
                }
            }
        }

        drained
    }
}

/// Lazy, finite sequence of lines from one output stream.
#[derive(Debug)]
pub struct LineStream {
    stream: StreamType,
    receiver: Option<mpsc::UnboundedReceiver<String>>,
}

impl LineStream {
    pub fn stream_type(&self) -> StreamType {
        self.stream
    }

    /// Next line, or `None` once the stream is exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        match self.receiver.as_mut() {
            Some(rx) => {
                let line = rx.recv().await;
                if line.is_none() {
                    self.receiver = None;
                }
                line
            }
            None => None,
        }
    }

    /// Drain the remaining lines into a vector.
    pub async fn collect_lines(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await {
            lines.push(line);
        }
        lines
    }
}

impl Stream for LineStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();
        match this.receiver.as_mut() {
            Some(rx) => match rx.poll_recv(cx) {
                Poll::Ready(None) => {
                    this.receiver = None;
                    Poll::Ready(None)
                }
                other => other,
            },
            None => Poll::Ready(None),
        }
    }
}
