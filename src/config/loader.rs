//! Configuration loading from the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::{AppConfig, Environment, Stage};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load `KEY=VALUE` pairs from `path` into the process environment.
///
/// Variables already present in the environment win. A missing file is
/// reported as `Ok(false)` so callers can log it and carry on with defaults.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl AppConfig {
    /// Build and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build and validate configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };
        let mut config = AppConfig::default();

        if let Some(port) = vars.parsed("PORT")? {
            config.server.port = port;
        }
        if let Some(host) = vars.string("HOST") {
            config.server.host = host;
        }
        if let Some(env) = vars.string("NODE_ENV") {
            config.server.environment = Environment::from(env.as_str());
        }
        if let Some(dir) = vars.string("PUBLIC_DIR") {
            config.server.public_dir = dir;
        }
        if let Some(secs) = vars.parsed("REQUEST_TIMEOUT_SECS")? {
            config.server.request_timeout_secs = secs;
        }
        if let Some(bytes) = vars.parsed("MAX_BODY_BYTES")? {
            config.server.max_body_bytes = bytes;
        }
        if let Some(n) = vars.parsed("MAX_IN_FLIGHT")? {
            config.server.max_in_flight = n;
        }
        if let Some(secs) = vars.parsed("SHUTDOWN_TIMEOUT_SECS")? {
            config.server.shutdown_timeout_secs = secs;
        }

        if let Some(uri) = vars.string("DATABASE_URI") {
            config.database.uri = uri;
        }

        if let Some(secret) = vars.string("JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }
        if let Some(raw) = vars.string("JWT_EXPIRE") {
            config.auth.jwt_expire_secs =
                parse_duration_secs(&raw).map_err(|reason| ConfigError::Invalid {
                    key: "JWT_EXPIRE",
                    value: raw.clone(),
                    reason,
                })?;
        }
        if let Some(days) = vars.parsed("JWT_COOKIE_EXPIRE")? {
            config.auth.cookie_expire_days = days;
        }

        if let Some(path) = vars.string("FILE_UPLOAD_PATH") {
            config.upload.path = path;
        }
        if let Some(bytes) = vars.parsed("MAX_FILE_UPLOAD")? {
            config.upload.max_file_bytes = bytes;
        }

        if let Some(secs) = vars.parsed("RATE_LIMIT_WINDOW_SECS")? {
            config.rate_limit.window_secs = secs;
        }
        if let Some(max) = vars.parsed("RATE_LIMIT_MAX")? {
            config.rate_limit.max_requests = max;
        }
        if let Some(secs) = vars.parsed("RATE_LIMIT_SWEEP_SECS")? {
            config.rate_limit.sweep_interval_secs = secs;
        }

        config.cors.allowed_origin = vars.string("CORS_ORIGIN").filter(|o| o != "*");

        if let Some(raw) = vars.string("MIDDLEWARE_DISABLED") {
            config.pipeline.disabled = parse_stages(&raw).map_err(|reason| ConfigError::Invalid {
                key: "MIDDLEWARE_DISABLED",
                value: raw.clone(),
                reason,
            })?;
        }

        if let Some(filter) = vars.string("LOG_FILTER") {
            config.observability.log_filter = filter;
        }
        config.observability.metrics_address = vars.string("METRICS_ADDRESS");

        validate_config(&config).map_err(ConfigError::Validation)?;

        Ok(config)
    }
}

struct Vars<'a, F> {
    lookup: &'a F,
}

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty trimmed value.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            }),
        }
    }
}

/// Parse `30d`, `12h`, `15m`, `45s` or a bare number of seconds.
pub fn parse_duration_secs(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], Some(c)),
        _ => (raw, None),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| "expected a number optionally followed by s, m, h or d".to_string())?;
    let factor = match unit {
        None | Some('s') => 1,
        Some('m') => 60,
        Some('h') => 60 * 60,
        Some('d') => 24 * 60 * 60,
        Some(other) => return Err(format!("unknown duration unit '{}'", other)),
    };
    value
        .checked_mul(factor)
        .ok_or_else(|| format!("duration '{}' is too large", raw))
}

fn parse_stages(raw: &str) -> Result<Vec<Stage>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Stage::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_from_empty_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.rate_limit.window_secs, 600);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.database.uri, "memory://");
        assert!(config.cors.allowed_origin.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("NODE_ENV", "production"),
            ("JWT_SECRET", "a-much-longer-production-secret"),
            ("JWT_EXPIRE", "12h"),
            ("MIDDLEWARE_DISABLED", "rate_limit, hpp"),
            ("CORS_ORIGIN", "https://app.example.com"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.server.environment.is_production());
        assert_eq!(config.auth.jwt_expire_secs, 12 * 3600);
        assert_eq!(config.pipeline.disabled, vec![Stage::RateLimit, Stage::Hpp]);
        assert_eq!(
            config.cors.allowed_origin.as_deref(),
            Some("https://app.example.com")
        );
    }

    #[test]
    fn test_invalid_number_is_reported_with_key() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        match err {
            ConfigError::Invalid { key, value, .. } => {
                assert_eq!(key, "PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_stage_rejected() {
        assert!(load(&[("MIDDLEWARE_DISABLED", "compression")]).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_secs("30d").unwrap(), 30 * 86_400);
        assert_eq!(parse_duration_secs("15m").unwrap(), 900);
        assert_eq!(parse_duration_secs("45").unwrap(), 45);
        assert!(parse_duration_secs("3w").is_err());
        assert!(parse_duration_secs("d").is_err());
        assert!(parse_duration_secs("18446744073709551615d").is_err());
        assert_eq!(parse_duration_secs("18446744073709551615").unwrap(), u64::MAX);
    }

    #[test]
    fn test_missing_env_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_env_file(&dir.path().join("config.env")).unwrap();
        assert!(!loaded);
    }
}
