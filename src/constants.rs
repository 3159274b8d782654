// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const API_PREFIX: &str = "api";
pub const API_VERSION: &str = "v1";

// Token configuration constants
pub const DEFAULT_JWT_ISSUER: &str = "user-management-service";
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 604_800;
pub const DEFAULT_RESET_TOKEN_TTL_SECS: i64 = 3600;
/// Upper bound on any configured token lifetime (10 years)
pub const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 24 * 3600;
/// Random bytes behind every opaque token (256 bits, hex encoded)
pub const OPAQUE_TOKEN_BYTES: usize = 32;

// Admission configuration constants
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 100;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;
pub const DEFAULT_MIN_AUTH_DURATION_MS: u64 = 100;

// Password hashing cost (argon2id)
pub const DEFAULT_HASH_MEMORY_KIB: u32 = 19 * 1024;
pub const DEFAULT_HASH_ITERATIONS: u32 = 2;
pub const DEFAULT_HASH_PARALLELISM: u32 = 1;

// Maintenance
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 3600;

// Listing
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
