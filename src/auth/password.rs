//! Password hashing with argon2id
//!
//! Digests are self-contained PHC strings (algorithm, cost, salt and hash),
//! so the cost can be raised later without touching stored rows: old digests
//! keep verifying with the parameters they were created with.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use crate::error::{Result, RustyAuthError};

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl HashCost {
    /// Cheapest cost argon2 accepts. Only suitable for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }

    fn params(&self) -> Result<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| RustyAuthError::ConfigError(format!("Invalid argon2 parameters: {}", e)))
    }

    /// Check the parameters are accepted by argon2
    pub fn validate(&self) -> Result<()> {
        self.params().map(|_| ())
    }
}

/// One-way salted password hasher
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self> {
        let params = cost.params()?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a plaintext password into a PHC string with a fresh random salt
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng()
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|e| RustyAuthError::HashingError(format!("Entropy source failed: {}", e)))?;
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| RustyAuthError::HashingError(e.to_string()))?;

        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| RustyAuthError::HashingError(e.to_string()))
    }

    /// Verify a plaintext password against a stored digest
    ///
    /// A malformed digest is an error; a mismatch is `Ok(false)`.
    pub fn verify(&self, digest: &str, plaintext: &str) -> Result<bool> {
        let parsed = PasswordHash::new(digest)
            .map_err(|e| RustyAuthError::HashingError(format!("Malformed password digest: {}", e)))?;

        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(RustyAuthError::HashingError(e.to_string())),
        }
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}
