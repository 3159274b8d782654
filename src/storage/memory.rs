//! In-memory credential store for development and testing
//!
//! Each collection sits behind its own lock and every operation holds that
//! lock for its whole read-check-write, which gives the same per-row
//! atomicity a SQL backend gets from single statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::*;
use crate::auth::user::{ProfileUpdate, User, UserRole, UserStats};
use crate::error::{Result, RustyAuthError};

/// User rows plus uniqueness indexes over non-deleted users
#[derive(Default)]
struct UserTable {
    rows: HashMap<String, User>,
    by_email: HashMap<String, String>,
    by_username: HashMap<String, String>,
}

impl UserTable {
    fn live(&self, id: Option<&String>) -> Option<User> {
        id.and_then(|id| self.rows.get(id))
            .filter(|user| !user.is_deleted())
            .cloned()
    }

    fn live_mut(&mut self, user_id: &str) -> Result<&mut User> {
        match self.rows.get_mut(user_id) {
            Some(user) if !user.is_deleted() => Ok(user),
            _ => Err(RustyAuthError::NotFound(format!("user {}", user_id))),
        }
    }

    /// Checks email and username independently so the caller learns which collided
    fn check_unique(&self, user: &User) -> Result<()> {
        if let Some(owner) = self.by_email.get(&user.email) {
            if owner != &user.id {
                return Err(RustyAuthError::Conflict("email already registered".into()));
            }
        }
        if let Some(owner) = self.by_username.get(&user.username) {
            if owner != &user.id {
                return Err(RustyAuthError::Conflict("username already taken".into()));
            }
        }
        Ok(())
    }

    fn unindex(&mut self, user: &User) {
        self.by_email.remove(&user.email);
        self.by_username.remove(&user.username);
    }

    fn index(&mut self, user: &User) {
        self.by_email.insert(user.email.clone(), user.id.clone());
        self.by_username.insert(user.username.clone(), user.id.clone());
    }
}

/// In-memory implementation of every credential storage trait
pub struct MemoryCredentialStore {
    users: Arc<RwLock<UserTable>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshTokenRecord>>>,
    reset_tokens: Arc<RwLock<HashMap<String, PasswordResetRecord>>>,
    audit_log: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(UserTable::default())),
            refresh_tokens: Arc::new(RwLock::new(HashMap::new())),
            reset_tokens: Arc::new(RwLock::new(HashMap::new())),
            audit_log: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Number of refresh token rows, including revoked and expired ones
    pub async fn refresh_token_count(&self) -> usize {
        self.refresh_tokens.read().await.len()
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a new shared in-memory credential store
pub fn create_memory_store() -> SharedCredentialStore {
    Arc::new(MemoryCredentialStore::new())
}

#[async_trait]
impl UserStorage for MemoryCredentialStore {
    async fn create_user(&self, user: User) -> Result<User> {
        let mut users = self.users.write().await;
        if users.rows.contains_key(&user.id) {
            return Err(RustyAuthError::Conflict("user id already exists".into()));
        }
        users.check_unique(&user)?;

        users.index(&user);
        users.rows.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.rows.get(user_id).filter(|u| !u.is_deleted()).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.live(users.by_email.get(email)))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.live(users.by_username.get(username)))
    }

    async fn get_user_by_login(&self, identifier: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .live(users.by_email.get(identifier))
            .or_else(|| users.live(users.by_username.get(identifier))))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        let previous = match users.rows.get(&user.id) {
            Some(existing) if !existing.is_deleted() => existing.clone(),
            _ => return Err(RustyAuthError::NotFound(format!("user {}", user.id))),
        };
        users.check_unique(user)?;

        let mut updated = user.clone();
        updated.created_at = previous.created_at;
        updated.deleted_at = None;
        updated.touch();

        users.unindex(&previous);
        users.index(&updated);
        users.rows.insert(updated.id.clone(), updated);
        Ok(())
    }

    async fn update_last_login(&self, user_id: &str) -> Result<()> {
        let mut users = self.users.write().await;
        users.live_mut(user_id)?.last_login_at = Some(Utc::now());
        Ok(())
    }

    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users.live_mut(user_id)?;
        user.password_hash = password_hash.to_string();
        user.touch();
        Ok(())
    }

    async fn update_role(&self, user_id: &str, role: UserRole) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users.live_mut(user_id)?;
        user.role = role;
        user.touch();
        Ok(user.clone())
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users.live_mut(user_id)?;
        update.apply(user);
        user.touch();
        Ok(user.clone())
    }

    async fn soft_delete_user(&self, user_id: &str) -> Result<()> {
        let mut users = self.users.write().await;
        let deleted = match users.rows.get_mut(user_id) {
            Some(user) if !user.is_deleted() => {
                let now = Utc::now();
                user.deleted_at = Some(now);
                user.updated_at = now;
                user.clone()
            }
            _ => return Err(RustyAuthError::NotFound(format!("user {}", user_id))),
        };
        // Frees the email and username for new registrations
        users.unindex(&deleted);
        Ok(())
    }

    async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut live: Vec<&User> = users.rows.values().filter(|u| !u.is_deleted()).collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(live.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn user_stats(&self) -> Result<UserStats> {
        let users = self.users.read().await;
        let mut stats = UserStats::default();
        for user in users.rows.values().filter(|u| !u.is_deleted()) {
            stats.total_users += 1;
            if user.is_active {
                stats.active_users += 1;
            }
            if user.is_verified {
                stats.verified_users += 1;
            }
            if user.role == UserRole::Admin {
                stats.admin_users += 1;
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl RefreshTokenStorage for MemoryCredentialStore {
    async fn create_refresh_token(&self, record: RefreshTokenRecord) -> Result<()> {
        let mut tokens = self.refresh_tokens.write().await;
        if tokens.contains_key(&record.token) {
            return Err(RustyAuthError::Conflict("refresh token already exists".into()));
        }
        tokens.insert(record.token.clone(), record);
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        let tokens = self.refresh_tokens.read().await;
        Ok(tokens.get(token).cloned())
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<bool> {
        let mut tokens = self.refresh_tokens.write().await;
        match tokens.get_mut(token) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(Utc::now());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RustyAuthError::NotFound("refresh token".into())),
        }
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        replacement: RefreshTokenRecord,
    ) -> Result<()> {
        let mut tokens = self.refresh_tokens.write().await;
        if tokens.contains_key(&replacement.token) {
            return Err(RustyAuthError::Conflict("refresh token already exists".into()));
        }

        match tokens.get_mut(old_token) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(Utc::now());
            }
            Some(_) => return Err(RustyAuthError::RevokedToken),
            None => return Err(RustyAuthError::NotFound("refresh token".into())),
        }

        tokens.insert(replacement.token.clone(), replacement);
        Ok(())
    }

    async fn revoke_user_refresh_tokens(&self, user_id: &str) -> Result<usize> {
        let mut tokens = self.refresh_tokens.write().await;
        let now = Utc::now();
        let mut count = 0;
        for record in tokens
            .values_mut()
            .filter(|r| r.user_id == user_id && r.revoked_at.is_none())
        {
            record.revoked_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, record| !record.is_expired_at(now));
        Ok(before - tokens.len())
    }
}

#[async_trait]
impl PasswordResetStorage for MemoryCredentialStore {
    async fn create_reset_token(&self, record: PasswordResetRecord) -> Result<()> {
        let mut tokens = self.reset_tokens.write().await;
        if tokens.contains_key(&record.token) {
            return Err(RustyAuthError::Conflict("reset token already exists".into()));
        }
        tokens.insert(record.token.clone(), record);
        Ok(())
    }

    async fn get_reset_token(&self, token: &str) -> Result<Option<PasswordResetRecord>> {
        let tokens = self.reset_tokens.read().await;
        Ok(tokens.get(token).cloned())
    }

    async fn claim_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<PasswordResetRecord> {
        let mut tokens = self.reset_tokens.write().await;
        let record = tokens
            .get_mut(token)
            .ok_or_else(|| RustyAuthError::NotFound("reset token".into()))?;

        if record.is_used() || record.is_claimed() {
            return Err(RustyAuthError::UsedToken);
        }
        if record.is_expired_at(now) {
            return Err(RustyAuthError::ExpiredToken);
        }
        record.claimed_at = Some(now);
        Ok(record.clone())
    }

    async fn release_reset_token(&self, token: &str) -> Result<()> {
        let mut tokens = self.reset_tokens.write().await;
        match tokens.get_mut(token) {
            Some(record) => {
                record.claimed_at = None;
                Ok(())
            }
            None => Err(RustyAuthError::NotFound("reset token".into())),
        }
    }

    async fn mark_reset_token_used(&self, token: &str) -> Result<()> {
        let mut tokens = self.reset_tokens.write().await;
        match tokens.get_mut(token) {
            Some(record) if record.used_at.is_none() => {
                record.used_at = Some(Utc::now());
                Ok(())
            }
            Some(_) => Err(RustyAuthError::UsedToken),
            None => Err(RustyAuthError::NotFound("reset token".into())),
        }
    }
}

#[async_trait]
impl AuditStorage for MemoryCredentialStore {
    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        self.audit_log.write().await.push(entry);
        Ok(())
    }

    async fn recent_audit_entries(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let log = self.audit_log.read().await;
        Ok(log
            .iter()
            .rev()
            .filter(|entry| user_id.map_or(true, |id| entry.user_id.as_deref() == Some(id)))
            .take(limit)
            .cloned()
            .collect())
    }
}
