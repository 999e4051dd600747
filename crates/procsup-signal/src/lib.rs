//! # procsup signal
//!
//! Translates operating-system signals into supervisory actions.
//!
//! The mapping is an explicit, immutable table. The unconditional-kill signal
//! has no `SignalKind` variant: no process can intercept it, so it cannot be
//! subscribed to by construction.

pub mod relay;
pub mod table;

pub use relay::{RelayHandle, SignalHandler, SignalRelay, SignalSender};
pub use table::{ActionTable, SignalAction, SignalKind};
