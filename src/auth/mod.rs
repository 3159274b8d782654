//! Authentication primitives: password hashing, token issuance, accounts

pub mod password;
pub mod token;
pub mod user;

// Re-export main components
pub use password::{HashCost, PasswordHasher};
pub use token::{extract_bearer_token, generate_opaque_token, Claims, TokenManager};
pub use user::{NewAccount, ProfileUpdate, User, UserRole, UserStats};
