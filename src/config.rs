//! Service configuration module
//! Handles the tunable parameters of the credential service

use crate::auth::password::HashCost;
use crate::constants::{
    DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_HASH_ITERATIONS, DEFAULT_HASH_MEMORY_KIB,
    DEFAULT_HASH_PARALLELISM, DEFAULT_HOST, DEFAULT_JWT_ISSUER, DEFAULT_MIN_AUTH_DURATION_MS,
    DEFAULT_PORT, DEFAULT_PURGE_INTERVAL_SECS, DEFAULT_RATE_LIMIT_BURST,
    DEFAULT_RATE_LIMIT_PER_SEC, DEFAULT_REFRESH_TOKEN_TTL_SECS, DEFAULT_RESET_TOKEN_TTL_SECS,
    MAX_TOKEN_TTL_SECS,
};
use crate::error::{Result, RustyAuthError};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration parameters
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub host: String,
    pub port: u16,
    /// HMAC secret for access token signing/validation
    pub jwt_secret: String,
    /// Issuer embedded in (and required of) every access token
    pub jwt_issuer: String,
    /// Access token lifetime
    pub access_token_ttl: chrono::Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: chrono::Duration,
    /// Password reset token lifetime
    pub reset_token_ttl: chrono::Duration,
    /// Global admission rate (requests per second)
    pub rate_limit_per_sec: u32,
    /// Global admission burst capacity
    pub rate_limit_burst: u32,
    /// Argon2 cost parameters
    pub hash_cost: HashCost,
    /// Minimum duration of enumeration-sensitive operations
    pub min_auth_duration: Duration,
    /// How often expired refresh tokens are purged
    pub purge_interval: Duration,
    /// Return the reset token in the forgot-password response body.
    /// Only for deployments without a mail collaborator.
    pub expose_reset_token: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        panic!("AuthConfig::default() is not allowed for security reasons. Use AuthConfig::from_env() instead.");
    }
}

fn env_or<T: FromStr>(keys: &[&str], default: T) -> T {
    keys.iter()
        .find_map(|key| env::var(key).ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Token lifetime from a configured number of seconds, in `1..=MAX_TOKEN_TTL_SECS`
fn token_ttl(name: &str, secs: i64) -> Result<chrono::Duration> {
    if !(1..=MAX_TOKEN_TTL_SECS).contains(&secs) {
        return Err(RustyAuthError::ConfigError(format!(
            "{} must be between 1 and {} seconds, got {}",
            name, MAX_TOKEN_TTL_SECS, secs
        )));
    }
    chrono::Duration::try_seconds(secs)
        .ok_or_else(|| RustyAuthError::ConfigError(format!("{} is out of range", name)))
}

impl AuthConfig {
    /// Create a test configuration - DANGEROUS: Only for testing!
    ///
    /// Uses a fixed signing key, the cheapest argon2 cost and no auth delay.
    pub fn for_testing() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jwt_secret: "test-jwt-key-only-for-unit-tests-never-use-in-production-42".to_string(),
            jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
            access_token_ttl: chrono::Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: chrono::Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            reset_token_ttl: chrono::Duration::seconds(DEFAULT_RESET_TOKEN_TTL_SECS),
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            hash_cost: HashCost::minimal(),
            min_auth_duration: Duration::ZERO,
            purge_interval: Duration::from_secs(DEFAULT_PURGE_INTERVAL_SECS),
            expose_reset_token: true,
        }
    }

    /// Validate that the signing secret meets security requirements
    fn validate_jwt_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(RustyAuthError::ConfigError(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        // Check for insecure default or example values
        let insecure_patterns = [
            "your-secret-key",
            "change-this",
            "change-in-production",
            "test-secret",
            "default",
            "password",
            "12345",
        ];

        for pattern in &insecure_patterns {
            if secret.contains(pattern) {
                return Err(RustyAuthError::ConfigError(format!(
                    "JWT secret contains insecure pattern '{}'. Please use a secure random secret generated with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        if secret.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RustyAuthError::ConfigError(
                "JWT secret should contain mixed characters (letters, numbers, symbols) for security".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_limits(&self) -> Result<()> {
        for (name, ttl) in [
            ("Access token lifetime", self.access_token_ttl),
            ("Refresh token lifetime", self.refresh_token_ttl),
            ("Reset token lifetime", self.reset_token_ttl),
        ] {
            token_ttl(name, ttl.num_seconds())?;
        }
        if self.rate_limit_per_sec == 0 || self.rate_limit_burst == 0 {
            return Err(RustyAuthError::ConfigError(
                "Rate limit and burst must be greater than zero".to_string(),
            ));
        }
        self.hash_cost.validate()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = env::var("RUSTY_AUTH_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env_or(&["RUSTY_AUTH_PORT", "SERVER_PORT"], DEFAULT_PORT);

        let jwt_secret = env::var("RUSTY_AUTH_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                RustyAuthError::ConfigError(
                    "JWT_SECRET environment variable is required for security. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;
        Self::validate_jwt_secret(&jwt_secret)?;

        let jwt_issuer =
            env::var("RUSTY_AUTH_JWT_ISSUER").unwrap_or(DEFAULT_JWT_ISSUER.to_string());

        let access_secs = env_or(
            &["RUSTY_AUTH_ACCESS_TOKEN_TTL_SECS", "JWT_ACCESS_EXPIRY"],
            DEFAULT_ACCESS_TOKEN_TTL_SECS,
        );
        let refresh_secs = env_or(
            &["RUSTY_AUTH_REFRESH_TOKEN_TTL_SECS", "JWT_REFRESH_EXPIRY"],
            DEFAULT_REFRESH_TOKEN_TTL_SECS,
        );
        let reset_secs = env_or(
            &["RUSTY_AUTH_RESET_TOKEN_TTL_SECS"],
            DEFAULT_RESET_TOKEN_TTL_SECS,
        );

        let rate_limit_per_sec = env_or(&["RUSTY_AUTH_RATE_LIMIT_PER_SEC"], DEFAULT_RATE_LIMIT_PER_SEC);
        let rate_limit_burst = env_or(&["RUSTY_AUTH_RATE_LIMIT_BURST"], DEFAULT_RATE_LIMIT_BURST);

        let hash_cost = HashCost {
            memory_kib: env_or(&["RUSTY_AUTH_HASH_MEMORY_KIB"], DEFAULT_HASH_MEMORY_KIB),
            iterations: env_or(&["RUSTY_AUTH_HASH_ITERATIONS"], DEFAULT_HASH_ITERATIONS),
            parallelism: env_or(&["RUSTY_AUTH_HASH_PARALLELISM"], DEFAULT_HASH_PARALLELISM),
        };

        let min_auth_ms = env_or(&["RUSTY_AUTH_MIN_AUTH_DURATION_MS"], DEFAULT_MIN_AUTH_DURATION_MS);
        let purge_secs = env_or(&["RUSTY_AUTH_PURGE_INTERVAL_SECS"], DEFAULT_PURGE_INTERVAL_SECS);

        let config = Self {
            host,
            port,
            jwt_secret,
            jwt_issuer,
            access_token_ttl: token_ttl("Access token lifetime", access_secs)?,
            refresh_token_ttl: token_ttl("Refresh token lifetime", refresh_secs)?,
            reset_token_ttl: token_ttl("Reset token lifetime", reset_secs)?,
            rate_limit_per_sec,
            rate_limit_burst,
            hash_cost,
            min_auth_duration: Duration::from_millis(min_auth_ms),
            purge_interval: Duration::from_secs(purge_secs.max(1)),
            expose_reset_token: env_or(&["RUSTY_AUTH_EXPOSE_RESET_TOKEN"], false),
        };
        config.validate_limits()?;

        Ok(config)
    }
}
