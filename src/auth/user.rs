use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RustyAuthError;

/// Service-wide user roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Moderator,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::Moderator => "moderator",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = RustyAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            "moderator" => Ok(UserRole::Moderator),
            other => Err(RustyAuthError::ValidationError(format!(
                "unknown role '{}', expected one of user, admin, moderator",
                other
            ))),
        }
    }
}

/// Represents a registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: String,
    /// Unique email address
    pub email: String,
    /// Unique username
    pub username: String,
    /// Argon2 PHC digest, never serialized outward
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub avatar_url: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Creates a new active, unverified account with the default role
    pub fn new(email: String, username: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            username,
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            avatar_url: String::new(),
            role: UserRole::User,
            is_active: true,
            is_verified: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Registration input
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
}

impl NewAccount {
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.email.contains('@') || self.email.len() > 255 {
            return Err(RustyAuthError::ValidationError("a valid email is required".into()));
        }
        let username_len = self.username.chars().count();
        if !(3..=50).contains(&username_len) {
            return Err(RustyAuthError::ValidationError(
                "username must be between 3 and 50 characters".into(),
            ));
        }
        validate_password(&self.password)?;
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(RustyAuthError::ValidationError(
                "first and last name are required".into(),
            ));
        }
        Ok(())
    }
}

/// Minimum password policy shared by registration, reset and change
pub fn validate_password(password: &str) -> crate::error::Result<()> {
    if password.chars().count() < 8 {
        return Err(RustyAuthError::ValidationError(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

/// Profile fields a user may edit. Empty fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub avatar_url: String,
}

impl ProfileUpdate {
    pub fn apply(&self, user: &mut User) {
        for (field, value) in [
            (&mut user.first_name, &self.first_name),
            (&mut user.last_name, &self.last_name),
            (&mut user.phone, &self.phone),
            (&mut user.avatar_url, &self.avatar_url),
        ] {
            if !value.is_empty() {
                *field = value.clone();
            }
        }
    }
}

/// Aggregate account counts over non-deleted users
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_users: usize,
    pub active_users: usize,
    pub verified_users: usize,
    pub admin_users: usize,
}
