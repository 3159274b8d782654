use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RustyAuthError {
    // Account errors
    Conflict(String),
    NotFound(String),

    // Credential errors
    InvalidCredentials,
    WrongPassword,

    // Token lifecycle errors
    InvalidToken,
    RevokedToken,
    ExpiredToken,
    UsedToken,

    // Admission errors
    Unauthorized,
    Forbidden,
    RateLimited,

    // Validation errors
    ValidationError(String),

    // Storage errors
    StorageError(String),

    // Crypto errors
    HashingError(String),
    SigningError(String),

    // Configuration errors
    ConfigError(String),

    // Observability errors
    MetricsError(String),
}

impl RustyAuthError {
    /// HTTP status the transport layer answers with for this outcome
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Conflict(_) => 409,
            Self::NotFound(_) => 404,
            Self::InvalidCredentials
            | Self::WrongPassword
            | Self::InvalidToken
            | Self::RevokedToken
            | Self::ExpiredToken
            | Self::UsedToken
            | Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::RateLimited => 429,
            Self::ValidationError(_) => 400,
            Self::StorageError(_)
            | Self::HashingError(_)
            | Self::SigningError(_)
            | Self::ConfigError(_)
            | Self::MetricsError(_) => 500,
        }
    }

    /// True for faults of the service itself rather than of the caller
    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}

impl fmt::Display for RustyAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::InvalidCredentials => write!(f, "Invalid credentials"),
            Self::WrongPassword => write!(f, "Current password is incorrect"),
            Self::InvalidToken => write!(f, "Invalid or expired token"),
            Self::RevokedToken => write!(f, "Token has been revoked"),
            Self::ExpiredToken => write!(f, "Token has expired"),
            Self::UsedToken => write!(f, "Token has already been used"),
            Self::Unauthorized => write!(f, "Unauthorized access"),
            Self::Forbidden => write!(f, "Forbidden: insufficient permissions"),
            Self::RateLimited => write!(f, "Rate limit exceeded"),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::HashingError(msg) => write!(f, "Password hashing error: {}", msg),
            Self::SigningError(msg) => write!(f, "Token signing error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::MetricsError(msg) => write!(f, "Metrics error: {}", msg),
        }
    }
}

impl Error for RustyAuthError {}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for RustyAuthError {
    fn from(err: PoisonError<T>) -> Self {
        RustyAuthError::StorageError(format!("Mutex poisoned: {}", err))
    }
}

// Generic result type for RustyAuth
pub type Result<T> = std::result::Result<T, RustyAuthError>;
