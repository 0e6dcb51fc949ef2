//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load env file → Build config → Init logging → Connect database
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain requests (bounded) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Graceful shutdown, exit 0
//!
//! Guard (guard.rs):
//!     Guarded task fails → "Error: <message>" → Graceful shutdown, exit 1
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then logging, then the store, then listeners
//! - One coordinator; the first trigger decides the exit status
//! - Shutdown has timeout: forced exit after deadline

pub mod guard;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use guard::FailureGuard;
pub use shutdown::{Shutdown, ShutdownReason, ShutdownSignal};
pub use startup::{bootstrap, Startup, StartupError};
