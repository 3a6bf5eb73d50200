//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Root configuration for the account service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener and request limits.
    pub server: ServerConfig,

    /// Log level and format.
    pub log: LogConfig,

    /// Token signing and API keys.
    pub auth: AuthConfig,

    /// In-process cache settings.
    pub cache: CacheConfig,

    /// Login lockout and rate limiting.
    pub security: SecurityConfig,

    /// Metrics exporter settings.
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Allowed CORS origins. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format: "pretty" or "json".
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign access tokens. Empty means "generate one
    /// at startup" (tokens then do not survive a restart).
    pub jwt_secret: String,

    /// Access token lifetime in seconds.
    pub token_ttl_secs: u64,

    /// Usernames that receive the admin role on registration.
    pub admin_usernames: Vec<String>,

    /// Keys accepted in the `X-API-Key` header.
    pub api_keys: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 24 * 60 * 60,
            admin_usernames: Vec::new(),
            api_keys: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Fill an empty `jwt_secret` with 32 random bytes, hex encoded.
    ///
    /// Returns `true` when a secret was generated.
    pub fn ensure_secret(&mut self) -> bool {
        if !self.jwt_secret.is_empty() {
            return false;
        }
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        self.jwt_secret = hex::encode(bytes);
        true
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache user lookups by id.
    pub enabled: bool,

    /// Lifetime of a cached user record in seconds.
    pub user_ttl_secs: u64,

    /// Schedule of the expired-entry sweep (e.g., "@every 60s").
    pub sweep_schedule: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_ttl_secs: 300,
            sweep_schedule: "@every 60s".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Failed logins allowed before the account is locked out.
    pub max_login_failures: u64,

    /// Lockout window in seconds.
    pub lockout_secs: u64,

    /// Requests per second per client on rate-limited routes.
    pub rate_limit_rps: u32,

    /// Burst capacity on rate-limited routes.
    pub rate_limit_burst: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_login_failures: 5,
            lockout_secs: 15 * 60,
            rate_limit_rps: 10,
            rate_limit_burst: 20,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
