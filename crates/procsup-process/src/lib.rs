//! # procsup process
//!
//! Low-level process operations used by the supervisor:
//! - Executable validation and `PATH` resolution
//! - Command construction and exit-status decoding
//! - Termination signals and forced kills by pid
//! - Process existence checks

pub mod check;
pub mod execute;
pub mod terminate;
pub mod validation;

pub use check::*;
pub use execute::*;
pub use terminate::*;
pub use validation::*;
