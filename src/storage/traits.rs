//! Abstract storage interfaces for pluggable credential backends
//!
//! The credential store exclusively owns persisted rows: users, refresh
//! tokens, password reset tokens and the append-only audit log. Every
//! single-row operation is atomic. Lookups never return soft-deleted users.
//!
//! "Absent" is `Ok(None)`; whether a present row is still usable is the
//! caller's decision, made with the helpers on each record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::user::{ProfileUpdate, User, UserRole, UserStats};
use crate::error::Result;

fn expiry_after(now: DateTime<Utc>, ttl: chrono::Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Stored refresh token row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Provenance of the request that minted the token
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RefreshTokenRecord {
    pub fn new(
        user_id: &str,
        token: String,
        ttl: chrono::Duration,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token,
            created_at: now,
            expires_at: expiry_after(now, ttl),
            revoked_at: None,
            ip_address,
            user_agent,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Usable iff not revoked and `now < expires_at`
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }
}

/// Stored password reset token row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetRecord {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    /// Set while a reset holding this token is in flight
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl PasswordResetRecord {
    pub fn new(user_id: &str, token: String, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token,
            created_at: now,
            expires_at: expiry_after(now, ttl),
            used_at: None,
            claimed_at: None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Append-only audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// User account storage interface
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Insert a new user. Fails with `Conflict` naming the colliding field
    /// if the email or username is held by a non-deleted user.
    async fn create_user(&self, user: User) -> Result<User>;

    /// Get user by ID
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get user by username
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user whose email or username equals `identifier`
    async fn get_user_by_login(&self, identifier: &str) -> Result<Option<User>>;

    /// Replace a user row. Fails with `NotFound` for unknown or deleted users.
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Update user's last login timestamp
    async fn update_last_login(&self, user_id: &str) -> Result<()>;

    /// Replace only the password digest, leaving every other column as stored
    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()>;

    /// Set only the role
    async fn update_role(&self, user_id: &str, role: UserRole) -> Result<User>;

    /// Apply the non-empty fields of `update` to the stored row
    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<User>;

    /// Tombstone a user; the row is kept
    async fn soft_delete_user(&self, user_id: &str) -> Result<()>;

    /// List users, newest first
    async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>>;

    /// Aggregate counts over non-deleted users
    async fn user_stats(&self) -> Result<UserStats>;
}

/// Refresh token storage interface
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Insert a token. Token strings are unique across all rows.
    async fn create_refresh_token(&self, record: RefreshTokenRecord) -> Result<()>;

    /// Get token row by token string, whatever its state
    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>>;

    /// Revoke a token. Returns false if it was already revoked.
    async fn revoke_refresh_token(&self, token: &str) -> Result<bool>;

    /// Revoke `old_token` and insert `replacement` as one atomic step.
    ///
    /// Fails with `RevokedToken` and inserts nothing if `old_token` was
    /// revoked in the meantime, so two concurrent rotations of the same
    /// token cannot both succeed.
    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        replacement: RefreshTokenRecord,
    ) -> Result<()>;

    /// Revoke every outstanding token of a user
    async fn revoke_user_refresh_tokens(&self, user_id: &str) -> Result<usize>;

    /// Physically remove rows expired before `now`
    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Password reset token storage interface
#[async_trait]
pub trait PasswordResetStorage: Send + Sync {
    /// Insert a reset token
    async fn create_reset_token(&self, record: PasswordResetRecord) -> Result<()>;

    /// Get reset token row by token string
    async fn get_reset_token(&self, token: &str) -> Result<Option<PasswordResetRecord>>;

    /// Reserve a token for a single in-flight reset.
    ///
    /// Fails with `NotFound` if absent, `UsedToken` if consumed or already
    /// claimed, and `ExpiredToken` if `now` is past its expiry. Of two
    /// concurrent claims at most one succeeds.
    async fn claim_reset_token(&self, token: &str, now: DateTime<Utc>)
        -> Result<PasswordResetRecord>;

    /// Drop a claim after a failed reset so the token can be presented again.
    /// A consumed token stays consumed.
    async fn release_reset_token(&self, token: &str) -> Result<()>;

    /// Set `used_at`. Fails with `UsedToken` if already consumed; there is
    /// no way back.
    async fn mark_reset_token_used(&self, token: &str) -> Result<()>;
}

/// Audit log storage interface
#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Append an entry
    async fn append_audit(&self, entry: AuditEntry) -> Result<()>;

    /// Most recent entries first, optionally for one user
    async fn recent_audit_entries(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>>;
}

/// Combined credential store interface
pub trait CredentialStore:
    UserStorage + RefreshTokenStorage + PasswordResetStorage + AuditStorage
{
}

impl<T> CredentialStore for T where
    T: UserStorage + RefreshTokenStorage + PasswordResetStorage + AuditStorage
{
}

/// Shared reference to a credential store
pub type SharedCredentialStore = Arc<dyn CredentialStore>;
