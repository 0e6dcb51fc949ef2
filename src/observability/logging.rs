//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber once at startup
//! - Honour `RUST_LOG`, falling back to the configured filter
//!
//! # Design Decisions
//! - Human-readable output in development, JSON everywhere else
//! - Initialization failure is a startup error, not a panic

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Environment, ObservabilityConfig};

pub fn init(config: &ObservabilityConfig, environment: &Environment) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if environment.is_development() {
        registry.with(fmt::layer().with_target(false)).try_init()
    } else {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    };
    result.map_err(|e| e.to_string())
}
