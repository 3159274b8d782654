//! Prometheus metrics for the credential service
//!
//! Exported metrics:
//! - `rusty_auth_logins_total{outcome}` - password logins
//! - `rusty_auth_refreshes_total{outcome}` - refresh token exchanges
//! - `rusty_auth_rate_limited_total` - requests turned away by the global limiter
//! - `rusty_auth_forbidden_total` - authenticated requests failing the role gate
//! - `rusty_auth_http_requests_total{method,status}` - answered HTTP requests
//! - `rusty_auth_http_request_duration_seconds{method}` - HTTP response time

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use crate::error::{Result, RustyAuthError};

impl From<prometheus::Error> for RustyAuthError {
    fn from(err: prometheus::Error) -> Self {
        RustyAuthError::MetricsError(err.to_string())
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

/// Counters and histograms behind one private registry
#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    logins: IntCounterVec,
    refreshes: IntCounterVec,
    rate_limited: IntCounter,
    forbidden: IntCounter,
    http_requests: IntCounterVec,
    http_request_duration: HistogramVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let logins = IntCounterVec::new(
            Opts::new("rusty_auth_logins_total", "Password login attempts"),
            &["outcome"],
        )?;
        registry.register(Box::new(logins.clone()))?;

        let refreshes = IntCounterVec::new(
            Opts::new("rusty_auth_refreshes_total", "Refresh token exchanges"),
            &["outcome"],
        )?;
        registry.register(Box::new(refreshes.clone()))?;

        let rate_limited = IntCounter::with_opts(Opts::new(
            "rusty_auth_rate_limited_total",
            "Requests rejected by the global rate limiter",
        ))?;
        registry.register(Box::new(rate_limited.clone()))?;

        let forbidden = IntCounter::with_opts(Opts::new(
            "rusty_auth_forbidden_total",
            "Requests rejected by the role gate",
        ))?;
        registry.register(Box::new(forbidden.clone()))?;

        // Paths carry user ids, so they stay out of the label set
        let http_requests = IntCounterVec::new(
            Opts::new("rusty_auth_http_requests_total", "Answered HTTP requests"),
            &["method", "status"],
        )?;
        registry.register(Box::new(http_requests.clone()))?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "rusty_auth_http_request_duration_seconds",
                "HTTP response time in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method"],
        )?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            registry,
            logins,
            refreshes,
            rate_limited,
            forbidden,
            http_requests,
            http_request_duration,
        })
    }

    pub fn record_login(&self, ok: bool) {
        self.logins.with_label_values(&[outcome(ok)]).inc();
    }

    pub fn record_refresh(&self, ok: bool) {
        self.refreshes.with_label_values(&[outcome(ok)]).inc();
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.inc();
    }

    pub fn record_forbidden(&self) {
        self.forbidden.inc();
    }

    pub fn record_request(&self, method: &str, status: u16, elapsed: Duration) {
        self.http_requests
            .with_label_values(&[method, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }

    /// Everything in the Prometheus text exposition format
    pub fn export(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| RustyAuthError::MetricsError(e.to_string()))
    }
}
