//! Tests for environment-driven configuration

use rusty_auth::config::AuthConfig;
use rusty_auth::error::RustyAuthError;
use std::env;
use std::sync::Mutex;

// Tests in this file mutate the process environment
static ENV_LOCK: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "RUSTY_AUTH_JWT_SECRET",
    "JWT_SECRET",
    "RUSTY_AUTH_PORT",
    "SERVER_PORT",
    "RUSTY_AUTH_ACCESS_TOKEN_TTL_SECS",
    "JWT_ACCESS_EXPIRY",
    "RUSTY_AUTH_REFRESH_TOKEN_TTL_SECS",
    "JWT_REFRESH_EXPIRY",
    "RUSTY_AUTH_RATE_LIMIT_BURST",
    "RUSTY_AUTH_EXPOSE_RESET_TOKEN",
];

fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<_> = VARS.iter().map(|k| (*k, env::var(k).ok())).collect();
    for key in VARS {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    f();

    for (key, value) in saved {
        match value {
            Some(val) => env::set_var(key, val),
            None => env::remove_var(key),
        }
    }
}

const GOOD_SECRET: &str = "k7Rz9_vQ2mX4pL8nW1sT6yB3cF0hJ5dG";

#[test]
fn test_defaults_with_secret() {
    with_env(&[("RUSTY_AUTH_JWT_SECRET", GOOD_SECRET)], || {
        let config = AuthConfig::from_env().expect("config should load");
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_issuer, "user-management-service");
        assert_eq!(config.access_token_ttl.num_seconds(), 3600);
        assert_eq!(config.refresh_token_ttl.num_seconds(), 7 * 24 * 3600);
        assert_eq!(config.reset_token_ttl.num_seconds(), 3600);
        assert_eq!(config.rate_limit_per_sec, 100);
        assert!(!config.expose_reset_token);
    });
}

#[test]
fn test_missing_secret_rejected() {
    with_env(&[], || {
        let err = AuthConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    });
}

#[test]
fn test_insecure_secrets_rejected() {
    for secret in [
        "short",
        "your-secret-key-change-in-production-please",
        "abcdefghijklmnopqrstuvwxyzabcdefghij",
    ] {
        with_env(&[("RUSTY_AUTH_JWT_SECRET", secret)], || {
            assert!(AuthConfig::from_env().is_err(), "accepted {}", secret);
        });
    }
}

#[test]
fn test_legacy_variable_names() {
    with_env(
        &[
            ("JWT_SECRET", GOOD_SECRET),
            ("SERVER_PORT", "9090"),
            ("JWT_ACCESS_EXPIRY", "900"),
        ],
        || {
            let config = AuthConfig::from_env().unwrap();
            assert_eq!(config.jwt_secret, GOOD_SECRET);
            assert_eq!(config.port, 9090);
            assert_eq!(config.access_token_ttl.num_seconds(), 900);
        },
    );
}

#[test]
fn test_prefixed_names_win() {
    with_env(
        &[
            ("RUSTY_AUTH_JWT_SECRET", GOOD_SECRET),
            ("RUSTY_AUTH_PORT", "7000"),
            ("SERVER_PORT", "9090"),
            ("RUSTY_AUTH_EXPOSE_RESET_TOKEN", "true"),
        ],
        || {
            let config = AuthConfig::from_env().unwrap();
            assert_eq!(config.port, 7000);
            assert!(config.expose_reset_token);
        },
    );
}

#[test]
fn test_zero_burst_rejected() {
    with_env(
        &[("RUSTY_AUTH_JWT_SECRET", GOOD_SECRET), ("RUSTY_AUTH_RATE_LIMIT_BURST", "0")],
        || {
            assert!(AuthConfig::from_env().is_err());
        },
    );
}

#[test]
fn test_out_of_range_lifetimes_rejected() {
    for value in ["9223372036854775807", "100000000000000", "0", "-60"] {
        with_env(
            &[
                ("RUSTY_AUTH_JWT_SECRET", GOOD_SECRET),
                ("RUSTY_AUTH_REFRESH_TOKEN_TTL_SECS", value),
            ],
            || {
                assert!(matches!(
                    AuthConfig::from_env(),
                    Err(RustyAuthError::ConfigError(_))
                ));
            },
        );
    }
}

#[test]
fn test_ten_year_lifetime_accepted() {
    with_env(
        &[
            ("RUSTY_AUTH_JWT_SECRET", GOOD_SECRET),
            ("JWT_REFRESH_EXPIRY", "315360000"),
        ],
        || {
            let config = AuthConfig::from_env().unwrap();
            assert_eq!(config.refresh_token_ttl.num_days(), 3650);
        },
    );
}
