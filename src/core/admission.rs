//! Admission Guard
//!
//! Every inbound request passes the global rate limiter before anything
//! else. Protected operations then require a bearer access token, and some
//! additionally require a role. The resolved identity travels as an explicit
//! `RequestContext` into the operation; it is never re-checked against the
//! store, so a still-valid access token outlives a deactivated account until
//! it expires.

use std::sync::Arc;

use crate::auth::token::{extract_bearer_token, Claims, TokenManager};
use crate::auth::user::UserRole;
use crate::core::rate_limiter::GlobalRateLimiter;
use crate::error::{Result, RustyAuthError};

/// Upper bound on accepted bearer token length
const MAX_TOKEN_LENGTH: usize = 4096;

/// Provenance of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }
}

/// Identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub client: ClientInfo,
}

impl RequestContext {
    pub fn from_claims(claims: Claims, client: ClientInfo) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            username: claims.username,
            role: claims.role,
            client,
        }
    }

    /// Role gate: the attached role must equal `required`
    pub fn require_role(&self, required: UserRole) -> Result<()> {
        if self.role == required {
            Ok(())
        } else {
            log::warn!(
                "Forbidden: user {} with role {} requires {}",
                self.user_id,
                self.role,
                required
            );
            Err(RustyAuthError::Forbidden)
        }
    }
}

/// Combined rate limit, bearer authentication and role gate
#[derive(Clone)]
pub struct AdmissionGuard {
    limiter: Arc<GlobalRateLimiter>,
    tokens: Arc<TokenManager>,
}

impl AdmissionGuard {
    pub fn new(limiter: Arc<GlobalRateLimiter>, tokens: Arc<TokenManager>) -> Self {
        Self { limiter, tokens }
    }

    /// Rate limit step, performed before any authentication work
    pub fn admit(&self) -> Result<()> {
        if self.limiter.try_acquire() {
            Ok(())
        } else {
            log::warn!(
                "Request rejected by global rate limiter (retry after {}s)",
                self.limiter.retry_after_secs()
            );
            Err(RustyAuthError::RateLimited)
        }
    }

    /// Bearer authentication of an already admitted request
    ///
    /// A missing header or one not of the exact form `Bearer <token>` is
    /// `Unauthorized`; a token that fails verification is `InvalidToken`.
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
        client: ClientInfo,
    ) -> Result<RequestContext> {
        let token = authorization
            .and_then(extract_bearer_token)
            .ok_or(RustyAuthError::Unauthorized)?;

        if token.len() > MAX_TOKEN_LENGTH {
            log::debug!("Bearer token rejected: {} bytes", token.len());
            return Err(RustyAuthError::InvalidToken);
        }

        let claims = self.tokens.verify_access_token(token)?;
        Ok(RequestContext::from_claims(claims, client))
    }

    /// Rate limit, then authenticate
    pub fn admit_authenticated(
        &self,
        authorization: Option<&str>,
        client: ClientInfo,
    ) -> Result<RequestContext> {
        self.admit()?;
        self.authenticate(authorization, client)
    }

    /// Rate limit, authenticate, then require `role`
    ///
    /// Authentication failures take precedence over the role check.
    pub fn require_role(
        &self,
        authorization: Option<&str>,
        client: ClientInfo,
        role: UserRole,
    ) -> Result<RequestContext> {
        let ctx = self.admit_authenticated(authorization, client)?;
        ctx.require_role(role)?;
        Ok(ctx)
    }
}
