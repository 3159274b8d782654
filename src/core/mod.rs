//! Core credential lifecycle and request admission

pub mod accounts;
pub mod admission;
pub mod maintenance;
pub mod rate_limiter;
pub mod session;

// Re-export main components for convenience
pub use accounts::{AccountService, PageRequest, UserPage};
pub use admission::{AdmissionGuard, ClientInfo, RequestContext};
pub use maintenance::{purge_expired_once, spawn_refresh_token_purge};
pub use rate_limiter::GlobalRateLimiter;
pub use session::{SessionManager, TokenPair};
