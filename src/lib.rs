//! Rusty Auth - credential and session lifecycle service
//!
//! Registration, password login, short-lived access tokens with rotating
//! refresh tokens, password reset flows and per-request admission control
//! (global rate limit, bearer authentication, role gate).

pub mod audit;
pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod security;
pub mod storage;

// Re-export main components
pub use config::AuthConfig;
pub use constants::*;
pub use error::{Result, RustyAuthError};
