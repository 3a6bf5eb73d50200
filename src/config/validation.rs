//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, sizes > 0)
//! - Validate addresses and schedule expressions
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::scheduler::Schedule;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

const MIN_SECRET_LEN: usize = 16;

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be > 0"));
    }

    match config.log.level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => errors.push(ValidationError::new("log.level", format!("unknown level '{other}'"))),
    }
    match config.log.format.to_ascii_lowercase().as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::new("log.format", format!("unknown format '{other}'"))),
    }

    // Empty is filled with a random secret at startup
    if !config.auth.jwt_secret.is_empty() && config.auth.jwt_secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::new(
            "auth.jwt_secret",
            format!("must be at least {MIN_SECRET_LEN} bytes"),
        ));
    }
    if config.auth.token_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.token_ttl_secs", "must be > 0"));
    }

    if let Err(e) = config.cache.sweep_schedule.parse::<Schedule>() {
        errors.push(ValidationError::new("cache.sweep_schedule", e.to_string()));
    }

    if config.security.max_login_failures == 0 {
        errors.push(ValidationError::new("security.max_login_failures", "must be > 0"));
    }
    if config.security.rate_limit_rps == 0 {
        errors.push(ValidationError::new("security.rate_limit_rps", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_secret_accepted_short_secret_rejected() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = String::new();
        assert!(validate_config(&config).is_ok());

        config.auth.jwt_secret = "CHANGE_ME".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "auth.jwt_secret");
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AppConfig::default();
        config.server.bind_address = "nowhere".into();
        config.server.request_timeout_secs = 0;
        config.auth.jwt_secret = "short".into();
        config.cache.sweep_schedule = "sometimes".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "server.bind_address",
                "server.request_timeout_secs",
                "auth.jwt_secret",
                "cache.sweep_schedule"
            ]
        );
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = AppConfig::default();
        config.observability.metrics_address = "bad".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
