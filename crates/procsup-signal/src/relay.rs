//! Signal relay.
//!
//! OS listener tasks push recognized signals into a bounded delivery queue;
//! a single dispatcher task drains the queue and calls the handler, one
//! signal at a time.

use crate::table::{ActionTable, SignalKind};
use async_trait::async_trait;
#[cfg(unix)]
use procsup_common::SupervisorError;
use procsup_common::SupervisorResult;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receiver of recognized signals
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn handle_signal(&self, kind: SignalKind);
}

/// Cloneable entry point into the delivery queue
#[derive(Clone, Debug)]
pub struct SignalSender {
    tx: mpsc::Sender<SignalKind>,
}

impl SignalSender {
    /// Queue `kind` for dispatch.
    ///
    /// Returns `false` if the signal was dropped because the queue is full
    /// or the dispatcher is gone, matching how the OS coalesces pending
    /// signals.
    pub fn deliver(&self, kind: SignalKind) -> bool {
        match self.tx.try_send(kind) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(signal = %kind, "Signal queue full, dropping signal");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(signal = %kind, "Signal dispatcher stopped, dropping signal");
                false
            }
        }
    }
}

/// Signal relay, not yet running.
pub struct SignalRelay {
    table: Arc<ActionTable>,
    tx: mpsc::Sender<SignalKind>,
    rx: mpsc::Receiver<SignalKind>,
    listeners: Vec<JoinHandle<()>>,
}

impl SignalRelay {
    /// Create a relay whose delivery queue holds `capacity` pending signals.
    pub fn new(table: ActionTable, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            table: Arc::new(table),
            tx,
            rx,
            listeners: Vec::new(),
        }
    }

    pub fn sender(&self) -> SignalSender {
        SignalSender {
            tx: self.tx.clone(),
        }
    }

    /// Subscribe to every OS signal the table maps to a stop action.
    pub fn listen_os(&mut self) -> SupervisorResult<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::signal;

            for kind in self.table.subscribed_kinds() {
                let mut stream = signal(kind.to_unix()).map_err(|e| {
                    SupervisorError::configuration(format!(
                        "Failed to subscribe to {}: {}",
                        kind, e
                    ))
                })?;
                let sender = self.sender();

                self.listeners.push(tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        info!("Received {} signal", kind);
                        sender.deliver(kind);
                    }
                }));
                debug!(signal = %kind, "Subscribed to signal");
            }
        }

        #[cfg(not(unix))]
        {
            if self.table.lookup(SignalKind::Interrupt).is_stop() {
                let sender = self.sender();
                self.listeners.push(tokio::spawn(async move {
                    while tokio::signal::ctrl_c().await.is_ok() {
                        info!("Received Ctrl+C signal");
                        sender.deliver(SignalKind::Interrupt);
                    }
                }));
            }
        }

        Ok(())
    }

    /// Start the dispatcher. Recognized signals reach `handler` in delivery
    /// order; signals mapped to `Ignore` are dropped here.
    pub fn spawn<H>(self, handler: Arc<H>) -> RelayHandle
    where
        H: SignalHandler + 'static,
    {
        let SignalRelay {
            table,
            tx,
            mut rx,
            listeners,
        } = self;

        let dispatcher = tokio::spawn(async move {
            while let Some(kind) = rx.recv().await {
                let action = table.lookup(kind);
                if !action.is_stop() {
                    debug!(signal = %kind, "Ignoring unrecognized signal");
                    continue;
                }
                debug!(signal = %kind, action = ?action, "Dispatching signal");
                handler.handle_signal(kind).await;
            }
            debug!("Signal dispatcher finished");
        });

        RelayHandle {
            sender: SignalSender { tx },
            listeners,
            dispatcher,
        }
    }
}

/// A running relay
pub struct RelayHandle {
    sender: SignalSender,
    listeners: Vec<JoinHandle<()>>,
    dispatcher: JoinHandle<()>,
}

impl RelayHandle {
    pub fn sender(&self) -> SignalSender {
        self.sender.clone()
    }

    /// Stop listening and dispatching.
    pub fn abort(&self) {
        for listener in &self.listeners {
            listener.abort();
        }
        self.dispatcher.abort();
    }
}
