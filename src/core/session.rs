//! Session Manager
//!
//! Stateless orchestration of the credential lifecycle over the store and
//! the token issuer: registration, login, refresh rotation, logout and the
//! password reset and change flows.
//!
//! Refresh token states: `issued -> revoked` (rotation or logout) and
//! `issued -> expired` (observed lazily). Nothing leaves those states.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditEvent, AuditLogger};
use crate::auth::password::PasswordHasher;
use crate::auth::token::{generate_opaque_token, token_fingerprint, Claims, TokenManager};
use crate::auth::user::{validate_password, NewAccount, User};
use crate::config::AuthConfig;
use crate::core::admission::ClientInfo;
use crate::error::{Result, RustyAuthError};
use crate::security::AuthTimer;
use crate::storage::{
    PasswordResetRecord, PasswordResetStorage, RefreshTokenRecord, RefreshTokenStorage,
    SharedCredentialStore, UserStorage,
};

/// Result of a successful login or refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user: User,
}

pub struct SessionManager {
    store: SharedCredentialStore,
    hasher: PasswordHasher,
    tokens: Arc<TokenManager>,
    audit: AuditLogger,
    refresh_ttl: chrono::Duration,
    reset_ttl: chrono::Duration,
    min_auth_duration: Duration,
}

impl SessionManager {
    pub fn new(
        config: &AuthConfig,
        store: SharedCredentialStore,
        tokens: Arc<TokenManager>,
    ) -> Result<Self> {
        Ok(Self {
            hasher: PasswordHasher::new(config.hash_cost)?,
            audit: AuditLogger::new(store.clone()),
            store,
            tokens,
            refresh_ttl: config.refresh_token_ttl,
            reset_ttl: config.reset_token_ttl,
            min_auth_duration: config.min_auth_duration,
        })
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Register a new account with role `user`, active and unverified
    pub async fn register(&self, account: NewAccount, client: &ClientInfo) -> Result<User> {
        account.validate()?;

        // Checked independently so the caller learns which field collided
        if self.store.get_user_by_email(&account.email).await?.is_some() {
            return Err(RustyAuthError::Conflict("email already registered".into()));
        }
        if self.store.get_user_by_username(&account.username).await?.is_some() {
            return Err(RustyAuthError::Conflict("username already taken".into()));
        }

        let digest = self.hasher.hash(&account.password)?;
        let mut user = User::new(account.email, account.username, digest);
        user.first_name = account.first_name;
        user.last_name = account.last_name;
        user.phone = account.phone;

        let user = self.store.create_user(user).await?;
        log::info!("Registered user {} ({})", user.username, user.id);
        self.audit
            .record(AuditEvent::UserRegistered { user_id: user.id.clone() }, client)
            .await;

        Ok(user)
    }

    /// Password login by email or username
    ///
    /// Unknown account, inactive account and wrong password all produce
    /// `InvalidCredentials`, after the same minimum duration.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair> {
        let timer = AuthTimer::new(self.min_auth_duration);
        let result = self.login_inner(identifier, password, client).await;
        timer.wait().await;
        result
    }

    async fn login_inner(
        &self,
        identifier: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair> {
        let mut user = match self.store.get_user_by_login(identifier).await? {
            Some(user) => user,
            None => return self.reject_login(None, "unknown account", client).await,
        };

        if !user.is_active {
            return self.reject_login(Some(user.id), "inactive account", client).await;
        }

        if !self.hasher.verify(&user.password_hash, password)? {
            return self.reject_login(Some(user.id), "wrong password", client).await;
        }

        match self.store.update_last_login(&user.id).await {
            Ok(()) => user.last_login_at = Some(Utc::now()),
            Err(e) => log::warn!("Failed to update last login for {}: {}", user.id, e),
        }

        let pair = self.issue_session(user, client).await?;
        self.audit
            .record(AuditEvent::LoginSucceeded { user_id: pair.user.id.clone() }, client)
            .await;
        Ok(pair)
    }

    async fn reject_login<T>(
        &self,
        user_id: Option<String>,
        reason: &'static str,
        client: &ClientInfo,
    ) -> Result<T> {
        self.audit
            .record(AuditEvent::LoginFailed { user_id, reason }, client)
            .await;
        Err(RustyAuthError::InvalidCredentials)
    }

    /// Mint an access token and a persisted refresh token for `user`
    async fn issue_session(&self, user: User, client: &ClientInfo) -> Result<TokenPair> {
        let access_token = self.tokens.issue_access_token(&user)?;
        let record = self.new_refresh_record(&user, client)?;
        let refresh_token = record.token.clone();
        self.store.create_refresh_token(record).await?;

        Ok(self.token_pair(access_token, refresh_token, user))
    }

    fn new_refresh_record(&self, user: &User, client: &ClientInfo) -> Result<RefreshTokenRecord> {
        Ok(RefreshTokenRecord::new(
            &user.id,
            generate_opaque_token()?,
            self.refresh_ttl,
            client.ip_address.clone(),
            client.user_agent.clone(),
        ))
    }

    fn token_pair(&self, access_token: String, refresh_token: String, user: User) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_ttl_secs(),
            user,
        }
    }

    /// Exchange a refresh token for a new pair; the presented token is spent
    ///
    /// Revoking the old token and storing its replacement is one atomic store
    /// step, so of two concurrent refreshes with the same token exactly one
    /// succeeds.
    pub async fn refresh(&self, refresh_token: &str, client: &ClientInfo) -> Result<TokenPair> {
        let record = self
            .store
            .get_refresh_token(refresh_token)
            .await?
            .ok_or(RustyAuthError::InvalidToken)?;

        if record.is_revoked() {
            self.audit
                .record(
                    AuditEvent::RefreshTokenReuse {
                        user_id: record.user_id.clone(),
                        token_id: record.id.clone(),
                    },
                    client,
                )
                .await;
            return Err(RustyAuthError::RevokedToken);
        }
        if record.is_expired_at(Utc::now()) {
            log::debug!("Expired refresh token {} presented", token_fingerprint(refresh_token));
            return Err(RustyAuthError::ExpiredToken);
        }

        let user = self
            .store
            .get_user(&record.user_id)
            .await?
            .ok_or_else(|| RustyAuthError::NotFound("user".into()))?;
        if !user.is_active {
            return Err(RustyAuthError::InvalidCredentials);
        }

        let access_token = self.tokens.issue_access_token(&user)?;
        let replacement = self.new_refresh_record(&user, client)?;
        let new_refresh_token = replacement.token.clone();

        match self.store.rotate_refresh_token(refresh_token, replacement).await {
            Ok(()) => {}
            Err(RustyAuthError::RevokedToken) => {
                log::warn!(
                    "Concurrent rotation of refresh token {} for user {}",
                    token_fingerprint(refresh_token),
                    user.id
                );
                return Err(RustyAuthError::RevokedToken);
            }
            // Purged between lookup and rotation
            Err(RustyAuthError::NotFound(_)) => return Err(RustyAuthError::InvalidToken),
            Err(e) => return Err(e),
        }

        self.audit
            .record(AuditEvent::TokenRefreshed { user_id: user.id.clone() }, client)
            .await;
        Ok(self.token_pair(access_token, new_refresh_token, user))
    }

    /// Revoke a refresh token. Revoking an already revoked token succeeds.
    pub async fn logout(&self, refresh_token: &str, client: &ClientInfo) -> Result<()> {
        let record = self
            .store
            .get_refresh_token(refresh_token)
            .await?
            .ok_or(RustyAuthError::InvalidToken)?;

        match self.store.revoke_refresh_token(refresh_token).await {
            Ok(true) => {
                self.audit
                    .record(AuditEvent::LoggedOut { user_id: record.user_id }, client)
                    .await;
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(RustyAuthError::NotFound(_)) => Err(RustyAuthError::InvalidToken),
            Err(e) => Err(e),
        }
    }

    /// Start a password reset
    ///
    /// Returns the reset token for a known email and `None` otherwise; both
    /// outcomes are successes and take the same minimum duration.
    pub async fn forgot_password(
        &self,
        email: &str,
        client: &ClientInfo,
    ) -> Result<Option<String>> {
        let timer = AuthTimer::new(self.min_auth_duration);
        let result = self.forgot_password_inner(email, client).await;
        timer.wait().await;
        result
    }

    async fn forgot_password_inner(
        &self,
        email: &str,
        client: &ClientInfo,
    ) -> Result<Option<String>> {
        let user = match self.store.get_user_by_email(email).await? {
            Some(user) => user,
            None => {
                log::debug!("Password reset requested for unknown email");
                return Ok(None);
            }
        };

        let token = generate_opaque_token()?;
        self.store
            .create_reset_token(PasswordResetRecord::new(&user.id, token.clone(), self.reset_ttl))
            .await?;

        self.audit
            .record(AuditEvent::PasswordResetRequested { user_id: user.id }, client)
            .await;
        Ok(Some(token))
    }

    /// Consume a reset token and set a new password
    ///
    /// The token is claimed before hashing so that a concurrent reset with
    /// the same token fails with `UsedToken` and its password never lands.
    /// It is marked used only after the password update is stored; a failed
    /// reset releases the claim. Every refresh token of the user is revoked
    /// afterwards.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<()> {
        validate_password(new_password)?;

        let record = match self.store.claim_reset_token(reset_token, Utc::now()).await {
            Ok(record) => record,
            Err(RustyAuthError::NotFound(_)) => return Err(RustyAuthError::InvalidToken),
            Err(e) => return Err(e),
        };

        let outcome = self.consume_reset_token(&record, new_password).await;
        if outcome.is_err() {
            if let Err(e) = self.store.release_reset_token(reset_token).await {
                log::warn!("Failed to release reset token {}: {}", record.id, e);
            }
        }
        let revoked_sessions = outcome?;

        log::info!(
            "Password reset for user {}, {} refresh tokens revoked",
            record.user_id,
            revoked_sessions
        );
        self.audit
            .record(
                AuditEvent::PasswordResetCompleted { user_id: record.user_id, revoked_sessions },
                client,
            )
            .await;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        record: &PasswordResetRecord,
        new_password: &str,
    ) -> Result<usize> {
        let digest = self.hasher.hash(new_password)?;
        self.store
            .update_password(&record.user_id, &digest)
            .await
            .map_err(user_not_found)?;
        self.store.mark_reset_token_used(&record.token).await?;
        self.store.revoke_user_refresh_tokens(&record.user_id).await
    }

    /// Change the password of an authenticated user after confirming the
    /// current one
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<()> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| RustyAuthError::NotFound("user".into()))?;

        if !self.hasher.verify(&user.password_hash, current_password)? {
            log::warn!("Password change for {} rejected: wrong current password", user_id);
            return Err(RustyAuthError::WrongPassword);
        }
        validate_password(new_password)?;

        let digest = self.hasher.hash(new_password)?;
        self.store
            .update_password(&user.id, &digest)
            .await
            .map_err(user_not_found)?;

        let revoked_sessions = self.store.revoke_user_refresh_tokens(&user.id).await?;
        self.audit
            .record(AuditEvent::PasswordChanged { user_id: user.id, revoked_sessions }, client)
            .await;
        Ok(())
    }

    /// Pure signature and expiry check, no store lookup
    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        self.tokens.verify_access_token(token)
    }
}

/// Collapse a store miss on a user row into the caller-facing `NotFound("user")`
pub(crate) fn user_not_found(err: RustyAuthError) -> RustyAuthError {
    match err {
        RustyAuthError::NotFound(_) => RustyAuthError::NotFound("user".into()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::create_memory_store;

    fn manager() -> (SessionManager, SharedCredentialStore) {
        let config = AuthConfig::for_testing();
        let store = create_memory_store();
        let tokens = Arc::new(TokenManager::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            config.access_token_ttl,
        ));
        (SessionManager::new(&config, store.clone(), tokens).unwrap(), store)
    }

    fn alice() -> NewAccount {
        NewAccount {
            email: "alice@x.com".into(),
            username: "alice".into(),
            password: "Secret123!".into(),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            phone: String::new(),
        }
    }

    #[tokio::test]
    async fn test_register_hashes_password() {
        let (sessions, store) = manager();
        let user = sessions.register(alice(), &ClientInfo::default()).await.unwrap();

        assert_ne!(user.password_hash, "Secret123!");
        assert!(user.is_active);
        assert!(!user.is_verified);
        let stored = store.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(stored.id, user.id);
    }

    #[tokio::test]
    async fn test_login_records_last_login() {
        let (sessions, store) = manager();
        sessions.register(alice(), &ClientInfo::default()).await.unwrap();

        let pair = sessions
            .login("alice@x.com", "Secret123!", &ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 3600);
        assert!(pair.user.last_login_at.is_some());

        let stored = store.get_user(&pair.user.id).await.unwrap().unwrap();
        assert!(stored.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_inactive_account_indistinguishable() {
        let (sessions, store) = manager();
        let mut user = sessions.register(alice(), &ClientInfo::default()).await.unwrap();
        user.is_active = false;
        store.update_user(&user).await.unwrap();

        let inactive = sessions
            .login("alice", "Secret123!", &ClientInfo::default())
            .await
            .unwrap_err();
        let unknown = sessions
            .login("nobody", "Secret123!", &ClientInfo::default())
            .await
            .unwrap_err();
        assert_eq!(inactive, unknown);
        assert_eq!(inactive, RustyAuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_refresh_binds_provenance() {
        let (sessions, store) = manager();
        sessions.register(alice(), &ClientInfo::default()).await.unwrap();
        let client = ClientInfo::new(Some("192.0.2.7".into()), Some("test-agent".into()));

        let pair = sessions.login("alice", "Secret123!", &client).await.unwrap();
        let record = store.get_refresh_token(&pair.refresh_token).await.unwrap().unwrap();
        assert_eq!(record.ip_address.as_deref(), Some("192.0.2.7"));
        assert_eq!(record.user_agent.as_deref(), Some("test-agent"));
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_user() {
        let (sessions, store) = manager();
        sessions.register(alice(), &ClientInfo::default()).await.unwrap();
        let pair = sessions
            .login("alice", "Secret123!", &ClientInfo::default())
            .await
            .unwrap();
        store.soft_delete_user(&pair.user.id).await.unwrap();

        assert_eq!(
            sessions.refresh(&pair.refresh_token, &ClientInfo::default()).await.unwrap_err(),
            RustyAuthError::NotFound("user".into())
        );
    }

    #[tokio::test]
    async fn test_change_password_checks_current() {
        let (sessions, _) = manager();
        let user = sessions.register(alice(), &ClientInfo::default()).await.unwrap();

        assert_eq!(
            sessions
                .change_password(&user.id, "wrong", "NewSecret456!", &ClientInfo::default())
                .await,
            Err(RustyAuthError::WrongPassword)
        );
        sessions
            .change_password(&user.id, "Secret123!", "NewSecret456!", &ClientInfo::default())
            .await
            .unwrap();
        assert!(sessions
            .login("alice", "NewSecret456!", &ClientInfo::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_failed_reset_releases_token() {
        let (sessions, store) = manager();
        let user = sessions.register(alice(), &ClientInfo::default()).await.unwrap();
        let token = sessions
            .forgot_password("alice@x.com", &ClientInfo::default())
            .await
            .unwrap()
            .unwrap();
        store.soft_delete_user(&user.id).await.unwrap();

        assert_eq!(
            sessions
                .reset_password(&token, "NewSecret456!", &ClientInfo::default())
                .await,
            Err(RustyAuthError::NotFound("user".into()))
        );
        let record = store.get_reset_token(&token).await.unwrap().unwrap();
        assert!(!record.is_used());
        assert!(!record.is_claimed());
    }
}
