//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API
//! server. Defaults mirror the values shipped in `config/config.env`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root configuration for the API server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener, environment and request bounds.
    pub server: ServerConfig,

    /// Document store connection.
    pub database: DatabaseConfig,

    /// Token signing and cookie settings.
    pub auth: AuthConfig,

    /// Multipart upload settings.
    pub upload: UploadConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Middleware stage toggles.
    pub pipeline: PipelineConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Whether the request logger stage should run.
    pub fn request_logging(&self) -> bool {
        self.server.environment.is_development() && self.pipeline.is_enabled(Stage::RequestLogger)
    }
}

/// Deployment environment, taken from `NODE_ENV`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
    #[serde(untagged)]
    Other(String),
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl From<&str> for Environment {
    fn from(value: &str) -> Self {
        match value.trim() {
            "development" => Environment::Development,
            "production" => Environment::Production,
            "test" => Environment::Test,
            other => Environment::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
            Environment::Test => f.write_str("test"),
            Environment::Other(name) => f.write_str(name),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port to listen on (0 picks an ephemeral port).
    pub port: u16,

    /// Bind host.
    pub host: String,

    /// Value of `NODE_ENV`.
    pub environment: Environment,

    /// Directory served as static files when no API route matches.
    pub public_dir: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Maximum number of requests processed concurrently.
    pub max_in_flight: usize,

    /// How long in-flight requests may drain after shutdown starts.
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
            environment: Environment::Development,
            public_dir: "./public".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            max_in_flight: 1024,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Document store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `memory://` or `file://<path>`.
    pub uri: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: "memory://".to_string(),
        }
    }
}

pub const DEV_JWT_SECRET: &str = "development-secret-change-me";

/// Token and cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret.
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Token lifetime in seconds.
    pub jwt_expire_secs: u64,

    /// Lifetime of the `token` cookie in days.
    pub cookie_expire_days: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_expire_secs: 30 * 24 * 60 * 60,
            cookie_expire_days: 30,
        }
    }
}

/// Upload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory uploaded photos are written to.
    pub path: String,

    /// Maximum size of a single uploaded file in bytes.
    pub max_file_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: "./public/uploads".to_string(),
            max_file_bytes: 1_000_000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of one counting window in seconds.
    pub window_secs: u64,

    /// Requests allowed per client per window.
    pub max_requests: u32,

    /// How often expired windows are evicted.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 10 * 60,
            max_requests: 100,
            sweep_interval_secs: 60,
        }
    }
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Single allowed origin. `None` allows any origin.
    pub allowed_origin: Option<String>,
}

/// A toggleable middleware stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BodyParser,
    CookieParser,
    RequestLogger,
    FileUpload,
    Sanitize,
    SecurityHeaders,
    Xss,
    RateLimit,
    Hpp,
    Cors,
    StaticFiles,
}

impl Stage {
    /// Pipeline order.
    pub const ALL: [Stage; 11] = [
        Stage::BodyParser,
        Stage::CookieParser,
        Stage::RequestLogger,
        Stage::FileUpload,
        Stage::Sanitize,
        Stage::SecurityHeaders,
        Stage::Xss,
        Stage::RateLimit,
        Stage::Hpp,
        Stage::Cors,
        Stage::StaticFiles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::BodyParser => "body_parser",
            Stage::CookieParser => "cookie_parser",
            Stage::RequestLogger => "request_logger",
            Stage::FileUpload => "file_upload",
            Stage::Sanitize => "sanitize",
            Stage::SecurityHeaders => "security_headers",
            Stage::Xss => "xss",
            Stage::RateLimit => "rate_limit",
            Stage::Hpp => "hpp",
            Stage::Cors => "cors",
            Stage::StaticFiles => "static_files",
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == wanted)
            .ok_or_else(|| format!("unknown middleware stage '{}'", s.trim()))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Middleware stage toggles.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stages switched off.
    pub disabled: Vec<Stage>,
}

impl PipelineConfig {
    pub fn is_enabled(&self, stage: Stage) -> bool {
        !self.disabled.contains(&stage)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Prometheus listener address; metrics export is off when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "bootcamp_api=info,tower_http=info".to_string(),
            metrics_address: None,
        }
    }
}
