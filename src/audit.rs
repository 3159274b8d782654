//! Audit trail for account and credential events
//!
//! Every event is written to the log facade and appended to the store's
//! audit log. Appending is best-effort: a failing audit write is logged and
//! never fails the operation that produced the event.

use serde_json::json;

use crate::auth::user::UserRole;
use crate::core::admission::ClientInfo;
use crate::storage::{AuditEntry, AuditStorage, SharedCredentialStore};

/// Auditable account and credential events
#[derive(Debug, Clone)]
pub enum AuditEvent {
    UserRegistered { user_id: String },
    LoginSucceeded { user_id: String },
    LoginFailed { user_id: Option<String>, reason: &'static str },
    TokenRefreshed { user_id: String },
    /// A revoked refresh token was presented again
    RefreshTokenReuse { user_id: String, token_id: String },
    LoggedOut { user_id: String },
    PasswordResetRequested { user_id: String },
    PasswordResetCompleted { user_id: String, revoked_sessions: usize },
    PasswordChanged { user_id: String, revoked_sessions: usize },
    ProfileUpdated { user_id: String },
    RoleChanged { user_id: String, actor_id: String, role: UserRole },
    AccountDeleted { user_id: String, actor_id: String },
}

impl AuditEvent {
    fn action(&self) -> &'static str {
        match self {
            AuditEvent::UserRegistered { .. } => "user.register",
            AuditEvent::LoginSucceeded { .. } => "auth.login",
            AuditEvent::LoginFailed { .. } => "auth.login_failed",
            AuditEvent::TokenRefreshed { .. } => "auth.refresh",
            AuditEvent::RefreshTokenReuse { .. } => "auth.refresh_reuse",
            AuditEvent::LoggedOut { .. } => "auth.logout",
            AuditEvent::PasswordResetRequested { .. } => "password.reset_requested",
            AuditEvent::PasswordResetCompleted { .. } => "password.reset",
            AuditEvent::PasswordChanged { .. } => "password.change",
            AuditEvent::ProfileUpdated { .. } => "user.update_profile",
            AuditEvent::RoleChanged { .. } => "user.update_role",
            AuditEvent::AccountDeleted { .. } => "user.delete",
        }
    }

    fn user_id(&self) -> Option<&str> {
        match self {
            AuditEvent::LoginFailed { user_id, .. } => user_id.as_deref(),
            AuditEvent::UserRegistered { user_id }
            | AuditEvent::LoginSucceeded { user_id }
            | AuditEvent::TokenRefreshed { user_id }
            | AuditEvent::RefreshTokenReuse { user_id, .. }
            | AuditEvent::LoggedOut { user_id }
            | AuditEvent::PasswordResetRequested { user_id }
            | AuditEvent::PasswordResetCompleted { user_id, .. }
            | AuditEvent::PasswordChanged { user_id, .. }
            | AuditEvent::ProfileUpdated { user_id }
            | AuditEvent::RoleChanged { user_id, .. }
            | AuditEvent::AccountDeleted { user_id, .. } => Some(user_id.as_str()),
        }
    }

    fn resource(&self) -> (&'static str, String) {
        match self {
            AuditEvent::RefreshTokenReuse { token_id, .. } => ("refresh_token", token_id.clone()),
            AuditEvent::TokenRefreshed { user_id } | AuditEvent::LoggedOut { user_id } => {
                ("refresh_token", user_id.clone())
            }
            other => ("user", other.user_id().unwrap_or_default().to_string()),
        }
    }

    fn details(&self) -> serde_json::Value {
        match self {
            AuditEvent::LoginFailed { reason, .. } => json!({ "reason": reason }),
            AuditEvent::PasswordResetCompleted { revoked_sessions, .. }
            | AuditEvent::PasswordChanged { revoked_sessions, .. } => {
                json!({ "revoked_sessions": revoked_sessions })
            }
            AuditEvent::RoleChanged { actor_id, role, .. } => {
                json!({ "actor_id": actor_id, "role": role })
            }
            AuditEvent::AccountDeleted { actor_id, .. } => json!({ "actor_id": actor_id }),
            _ => json!({}),
        }
    }

    fn log(&self, client: &ClientInfo) {
        match self {
            AuditEvent::LoginFailed { user_id, reason } => {
                log::warn!(
                    "AUDIT: Login failed - User: {:?}, IP: {:?}, Reason: {}",
                    user_id, client.ip_address, reason
                );
            }
            AuditEvent::RefreshTokenReuse { user_id, token_id } => {
                log::warn!(
                    "AUDIT: Revoked refresh token presented again - User: {}, Token row: {}, IP: {:?}",
                    user_id, token_id, client.ip_address
                );
            }
            AuditEvent::RoleChanged { user_id, actor_id, role } => {
                log::info!("AUDIT: Role of {} set to {} by {}", user_id, role, actor_id);
            }
            AuditEvent::AccountDeleted { user_id, actor_id } => {
                log::info!("AUDIT: Account {} deleted by {}", user_id, actor_id);
            }
            other => {
                log::info!(
                    "AUDIT: {} - User: {:?}, IP: {:?}",
                    other.action(),
                    other.user_id(),
                    client.ip_address
                );
            }
        }
    }
}

/// Writes audit events to the log and the credential store
#[derive(Clone)]
pub struct AuditLogger {
    store: SharedCredentialStore,
}

impl AuditLogger {
    pub fn new(store: SharedCredentialStore) -> Self {
        Self { store }
    }

    pub async fn record(&self, event: AuditEvent, client: &ClientInfo) {
        event.log(client);

        let (resource, resource_id) = event.resource();
        let entry = AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: event.user_id().map(str::to_string),
            action: event.action().to_string(),
            resource: resource.to_string(),
            resource_id,
            details: event.details(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            created_at: chrono::Utc::now(),
        };

        if let Err(e) = self.store.append_audit(entry).await {
            log::error!("Failed to append audit entry '{}': {}", event.action(), e);
        }
    }
}
