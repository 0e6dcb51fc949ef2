//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the environment file, then build and validate configuration
//! - Initialize logging from that configuration
//! - Connect the document store
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, nothing is retried
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::path::Path;

use crate::config::{load_env_file, AppConfig, ConfigError};
use crate::db::{Database, DbError};
use crate::observability::logging;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("failed to connect to database: {0}")]
    Database(#[from] DbError),
}

/// Everything the server needs once startup succeeds.
pub struct Startup {
    pub config: AppConfig,
    pub db: Database,
}

/// Run startup in order: env file → config → logging → database.
pub async fn bootstrap(env_file: &Path, port: Option<u16>) -> Result<Startup, StartupError> {
    let env_loaded = load_env_file(env_file)?;

    let mut config = AppConfig::from_env()?;
    if let Some(port) = port {
        config.server.port = port;
    }

    logging::init(&config.observability, &config.server.environment)
        .map_err(StartupError::Logging)?;

    if env_loaded {
        tracing::info!(path = %env_file.display(), "Environment file loaded");
    } else {
        tracing::warn!(path = %env_file.display(), "Environment file not found, using process environment");
    }

    tracing::info!(
        environment = %config.server.environment,
        port = config.server.port,
        disabled_stages = ?config.pipeline.disabled,
        "Configuration loaded"
    );

    let db = Database::connect(&config.database.uri).await?;
    tracing::info!(uri = %config.database.uri, "Database connected");

    Ok(Startup { config, db })
}
