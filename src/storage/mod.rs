//! Credential storage: users, refresh tokens, reset tokens and audit log

pub mod memory;
pub mod traits;

// Re-export main components
pub use memory::{create_memory_store, MemoryCredentialStore};
pub use traits::{
    AuditEntry, AuditStorage, CredentialStore, PasswordResetRecord, PasswordResetStorage,
    RefreshTokenRecord, RefreshTokenStorage, SharedCredentialStore, UserStorage,
};
