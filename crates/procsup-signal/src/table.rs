//! Signal kinds and the action table

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Signals the relay knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// SIGHUP
    Hangup,
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGQUIT
    Quit,
    /// SIGUSR1
    User1,
    /// SIGUSR2
    User2,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Hangup => write!(f, "SIGHUP"),
            SignalKind::Interrupt => write!(f, "SIGINT"),
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Quit => write!(f, "SIGQUIT"),
            SignalKind::User1 => write!(f, "SIGUSR1"),
            SignalKind::User2 => write!(f, "SIGUSR2"),
        }
    }
}

impl SignalKind {
    #[cfg(unix)]
    pub fn to_unix(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind as Unix;

        match self {
            SignalKind::Hangup => Unix::hangup(),
            SignalKind::Interrupt => Unix::interrupt(),
            SignalKind::Terminate => Unix::terminate(),
            SignalKind::Quit => Unix::quit(),
            SignalKind::User1 => Unix::user_defined1(),
            SignalKind::User2 => Unix::user_defined2(),
        }
    }
}

/// What the supervisor does when a signal arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    /// Ask children to exit, force-kill after the grace period
    GracefulStop { exit_code: i32 },
    /// Force-kill children right away
    ImmediateStop { exit_code: i32 },
    /// Do nothing
    Ignore,
}

impl SignalAction {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SignalAction::GracefulStop { exit_code } | SignalAction::ImmediateStop { exit_code } => {
                Some(*exit_code)
            }
            SignalAction::Ignore => None,
        }
    }

    pub fn is_stop(&self) -> bool {
        !matches!(self, SignalAction::Ignore)
    }
}

/// Immutable mapping from signal kind to action.
///
/// Kinds without an entry map to `Ignore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTable {
    entries: BTreeMap<SignalKind, SignalAction>,
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::from_entries([
            (SignalKind::Hangup, SignalAction::GracefulStop { exit_code: 0 }),
            (SignalKind::Interrupt, SignalAction::ImmediateStop { exit_code: 1 }),
            (SignalKind::Terminate, SignalAction::ImmediateStop { exit_code: 1 }),
            (SignalKind::Quit, SignalAction::ImmediateStop { exit_code: 1 }),
        ])
    }
}

impl ActionTable {
    pub fn from_entries(entries: impl IntoIterator<Item = (SignalKind, SignalAction)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn lookup(&self, kind: SignalKind) -> SignalAction {
        self.entries
            .get(&kind)
            .copied()
            .unwrap_or(SignalAction::Ignore)
    }

    /// Kinds worth subscribing to: those mapped to a stop action.
    pub fn subscribed_kinds(&self) -> Vec<SignalKind> {
        self.entries
            .iter()
            .filter(|(_, action)| action.is_stop())
            .map(|(kind, _)| *kind)
            .collect()
    }
}
