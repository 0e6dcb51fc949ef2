//! Shutdown coordination for the API server.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Why the server is going down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS signal was received.
    Signal(&'static str),
    /// A guarded task failed.
    Fatal(String),
    /// The listener stopped without a trigger.
    Closed,
}

impl ShutdownReason {
    /// Process exit status for this reason.
    pub fn exit_code(&self) -> u8 {
        match self {
            ShutdownReason::Fatal(_) => 1,
            ShutdownReason::Signal(_) | ShutdownReason::Closed => 0,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {}", name),
            ShutdownReason::Fatal(message) => write!(f, "fatal error: {}", message),
            ShutdownReason::Closed => f.write_str("listener closed"),
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// Every long-running task holds a [`ShutdownSignal`]. The first call to
/// [`Shutdown::trigger`] decides the reason; later calls are ignored.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Start shutting down. Returns `false` if shutdown had already begun.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let description = reason.to_string();
        let first = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if first {
            tracing::info!(reason = %description, "Shutdown triggered");
        }
        first
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.tx.borrow().clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of [`Shutdown`].
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownSignal {
    /// Wait until shutdown is triggered and return the reason.
    pub async fn recv(&mut self) -> ShutdownReason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(ShutdownReason::Closed),
            // Coordinator dropped without a trigger.
            Err(_) => ShutdownReason::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_trigger_wins() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        assert!(!shutdown.is_triggered());

        assert!(shutdown.trigger(ShutdownReason::Fatal("boom".into())));
        assert!(!shutdown.trigger(ShutdownReason::Signal("SIGTERM")));

        let reason = signal.recv().await;
        assert_eq!(reason, ShutdownReason::Fatal("boom".into()));
        assert_eq!(reason.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger(ShutdownReason::Signal("SIGINT"));
        let reason = shutdown.subscribe().recv().await;
        assert_eq!(reason.exit_code(), 0);
    }
}
