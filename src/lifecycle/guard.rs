//! Process-level failure guard.
//!
//! Background tasks that must never fail are spawned through
//! [`FailureGuard::spawn`]. If one returns an error or panics, the guard
//! logs `Error: <message>` and triggers a fatal shutdown: the listener
//! stops accepting, in-flight requests drain, and the process exits 1.

use std::any::Any;
use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;

use super::shutdown::{Shutdown, ShutdownReason};

#[derive(Clone)]
pub struct FailureGuard {
    shutdown: Shutdown,
}

impl FailureGuard {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }

    /// Report an unrecoverable failure and start the fatal shutdown.
    pub fn report(&self, task: &str, message: impl fmt::Display) {
        let message = message.to_string();
        tracing::error!(task, "Error: {}", message);
        self.shutdown.trigger(ShutdownReason::Fatal(message));
    }

    /// Spawn `fut` and watch it. An `Err` or a panic is reported.
    pub fn spawn<F, E>(&self, task: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let guard = self.clone();
        let handle = tokio::spawn(fut);
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(())) => tracing::debug!(task, "Guarded task finished"),
                Ok(Err(e)) => guard.report(task, e),
                Err(e) if e.is_panic() => guard.report(task, panic_message(e.into_panic())),
                Err(_) => tracing::debug!(task, "Guarded task cancelled"),
            }
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
