//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (parsing handles syntax)
//! - Validate value ranges (windows > 0, limits > 0, token lifetimes bounded)
//! - Reject development secrets in production
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: AppConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::{AppConfig, DEV_JWT_SECRET};

/// Longest accepted token and cookie lifetime.
const MAX_TOKEN_LIFETIME_DAYS: u64 = 3650;
const MAX_TOKEN_LIFETIME_SECS: u64 = MAX_TOKEN_LIFETIME_DAYS * 24 * 60 * 60;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("REQUEST_TIMEOUT_SECS", "must be greater than 0"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("MAX_BODY_BYTES", "must be greater than 0"));
    }
    if config.server.max_in_flight == 0 {
        errors.push(ValidationError::new("MAX_IN_FLIGHT", "must be greater than 0"));
    }
    if config.upload.max_file_bytes == 0 {
        errors.push(ValidationError::new("MAX_FILE_UPLOAD", "must be greater than 0"));
    } else if config.upload.max_file_bytes > config.server.max_body_bytes {
        errors.push(ValidationError::new(
            "MAX_FILE_UPLOAD",
            "must not exceed MAX_BODY_BYTES",
        ));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("RATE_LIMIT_WINDOW_SECS", "must be greater than 0"));
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new("RATE_LIMIT_MAX", "must be greater than 0"));
    }
    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("RATE_LIMIT_SWEEP_SECS", "must be greater than 0"));
    }
    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::new("JWT_SECRET", "must not be empty"));
    }
    if config.auth.jwt_expire_secs > MAX_TOKEN_LIFETIME_SECS {
        errors.push(ValidationError::new(
            "JWT_EXPIRE",
            format!("must not exceed {} days", MAX_TOKEN_LIFETIME_DAYS),
        ));
    }
    if config.auth.cookie_expire_days > MAX_TOKEN_LIFETIME_DAYS {
        errors.push(ValidationError::new(
            "JWT_COOKIE_EXPIRE",
            format!("must not exceed {} days", MAX_TOKEN_LIFETIME_DAYS),
        ));
    }
    if config.server.environment.is_production()
        && (config.auth.jwt_secret == DEV_JWT_SECRET || config.auth.jwt_secret.len() < 16)
    {
        errors.push(ValidationError::new(
            "JWT_SECRET",
            "must be set to a strong secret in production",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
