//! # procsup stdio
//!
//! Byte-stream plumbing between a supervisor and its children:
//! - Per-stream routing (`Inherit`, `Null`, `Pipe`, `RedirectToFile`)
//! - Draining tasks attached at spawn time so a child never stalls on a full pipe
//! - Line-oriented stdin writes and lazy, order-preserving line reads

pub mod pipeline;
pub mod types;

pub use pipeline::{DrainTasks, LineStream, StdioPipeline};
pub use types::{PipelineStatus, StdioConfig, StdioRouting, StreamStatus, StreamType};
