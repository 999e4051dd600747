//! # procsup common
//!
//! Error types shared by every procsup crate.
//!
//! Each failure a supervisor can surface has its own variant, so callers can
//! match on the kind instead of inspecting numeric codes or message text.

pub mod errors;

pub use errors::{SupervisorError, SupervisorResult};
