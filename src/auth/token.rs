use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::auth::user::{User, UserRole};
use crate::constants::OPAQUE_TOKEN_BYTES;
use crate::error::{Result, RustyAuthError};

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    /// Issuer
    pub iss: String,
    /// Issued at (as UTC timestamp)
    pub iat: i64,
    /// Expiration time (as UTC timestamp)
    pub exp: i64,
}

impl Claims {
    /// Creates claims for a user valid for `ttl` from now
    pub fn for_user(user: &User, issuer: &str, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role,
            iss: issuer.to_string(),
            iat: now,
            exp: now.saturating_add(ttl.num_seconds()),
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.exp
    }
}

/// Manages access token signing and verification
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: chrono::Duration,
}

impl TokenManager {
    /// Creates a new token manager with a shared HMAC secret
    pub fn new(secret: &str, issuer: &str, access_ttl: chrono::Duration) -> Self {
        // Only HS256 is accepted; tokens declaring any other algorithm are rejected
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            access_ttl,
        }
    }

    /// Access token lifetime in seconds
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Signs arbitrary claims with the service key
    pub fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| RustyAuthError::SigningError(format!("Failed to sign token: {}", e)))
    }

    /// Issues a signed access token for the given user
    pub fn issue_access_token(&self, user: &User) -> Result<String> {
        let claims = Claims::for_user(user, &self.issuer, self.access_ttl);
        self.encode_claims(&claims)
    }

    /// Verifies signature, algorithm, issuer and expiry and returns the claims
    ///
    /// Every failure collapses into `InvalidToken` so callers cannot tell a
    /// malformed token from a tampered or expired one.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                log::debug!("Access token rejected: {}", e);
                RustyAuthError::InvalidToken
            })?;

        // jsonwebtoken accepts exp == now; the window is half-open
        if claims.is_expired() {
            return Err(RustyAuthError::InvalidToken);
        }

        Ok(claims)
    }
}

/// Generates an opaque token: 256 random bits, hex encoded
///
/// Used for refresh and password reset tokens, whose validity lives entirely
/// in the store.
pub fn generate_opaque_token() -> Result<String> {
    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    rand::thread_rng()
        .try_fill_bytes(&mut bytes)
        .map_err(|e| RustyAuthError::SigningError(format!("Entropy source failed: {}", e)))?;
    Ok(hex::encode(bytes))
}

/// Extracts bearer token from Authorization header
///
/// Only the exact form `Bearer <token>` is accepted.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let token = auth_header.strip_prefix("Bearer ")?;
    if token.is_empty() || token.contains(char::is_whitespace) {
        None
    } else {
        Some(token)
    }
}

/// Shortened token form for log lines
pub fn token_fingerprint(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    &token[..end]
}
