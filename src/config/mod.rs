//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config/config.env
//!     → loader.rs (dotenvy into the process environment)
//!     → loader.rs (typed AppConfig from environment variables)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - Every variable has a default so an empty environment still boots
//! - Variables are read through a lookup function so tests never touch
//!   the real process environment

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_env_file, ConfigError};
pub use schema::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, Environment, ObservabilityConfig,
    PipelineConfig, RateLimitConfig, ServerConfig, Stage, UploadConfig,
};
