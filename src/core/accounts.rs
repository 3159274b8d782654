//! Account operations on behalf of an authenticated caller
//!
//! Administrative operations expect a `RequestContext` that already passed
//! the admin role gate; they check it again so that no caller can skip it.

use serde::Serialize;

use crate::audit::{AuditEvent, AuditLogger};
use crate::auth::user::{ProfileUpdate, User, UserRole, UserStats};
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::core::admission::RequestContext;
use crate::core::session::user_not_found;
use crate::error::{Result, RustyAuthError};
use crate::storage::{RefreshTokenStorage, SharedCredentialStore, UserStorage};

/// Page request for user listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    /// Page numbers start at 1; the limit is clamped to `1..=MAX_PAGE_SIZE`
    pub fn new(page: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of a user listing
#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: usize,
    pub limit: usize,
    /// Non-deleted accounts overall
    pub total: usize,
}

#[derive(Clone)]
pub struct AccountService {
    store: SharedCredentialStore,
    audit: AuditLogger,
}

impl AccountService {
    pub fn new(store: SharedCredentialStore) -> Self {
        Self {
            audit: AuditLogger::new(store.clone()),
            store,
        }
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| RustyAuthError::NotFound("user".into()))
    }

    /// Apply the non-empty fields of `update` to the caller's profile
    pub async fn update_profile(&self, ctx: &RequestContext, update: ProfileUpdate) -> Result<User> {
        let user = self
            .store
            .update_profile(&ctx.user_id, &update)
            .await
            .map_err(user_not_found)?;

        self.audit
            .record(AuditEvent::ProfileUpdated { user_id: user.id.clone() }, &ctx.client)
            .await;
        Ok(user)
    }

    /// Soft delete the caller's own account and end all of its sessions
    pub async fn delete_account(&self, ctx: &RequestContext) -> Result<()> {
        self.remove(&ctx.user_id, ctx).await
    }

    /// Soft delete any account (admin)
    pub async fn delete_user(&self, ctx: &RequestContext, user_id: &str) -> Result<()> {
        ctx.require_role(UserRole::Admin)?;
        self.remove(user_id, ctx).await
    }

    async fn remove(&self, user_id: &str, ctx: &RequestContext) -> Result<()> {
        self.store.soft_delete_user(user_id).await?;
        let revoked = self.store.revoke_user_refresh_tokens(user_id).await?;
        log::info!("User {} deleted, {} refresh tokens revoked", user_id, revoked);

        self.audit
            .record(
                AuditEvent::AccountDeleted {
                    user_id: user_id.to_string(),
                    actor_id: ctx.user_id.clone(),
                },
                &ctx.client,
            )
            .await;
        Ok(())
    }

    /// Newest accounts first (admin)
    pub async fn list_users(&self, ctx: &RequestContext, page: PageRequest) -> Result<UserPage> {
        ctx.require_role(UserRole::Admin)?;
        let users = self.store.list_users(page.limit, page.offset()).await?;
        let total = self.store.user_stats().await?.total_users;
        Ok(UserPage {
            users,
            page: page.page,
            limit: page.limit,
            total,
        })
    }

    /// Set the role of an account (admin)
    pub async fn update_role(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        role: UserRole,
    ) -> Result<User> {
        ctx.require_role(UserRole::Admin)?;

        let user = self
            .store
            .update_role(user_id, role)
            .await
            .map_err(user_not_found)?;

        self.audit
            .record(
                AuditEvent::RoleChanged {
                    user_id: user.id.clone(),
                    actor_id: ctx.user_id.clone(),
                    role,
                },
                &ctx.client,
            )
            .await;
        Ok(user)
    }

    /// Aggregate account counts (admin)
    pub async fn stats(&self, ctx: &RequestContext) -> Result<UserStats> {
        ctx.require_role(UserRole::Admin)?;
        self.store.user_stats().await
    }
}
