// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DATA_DIRECTORY: &str = "./data";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Environment variable prefix for every configuration section
pub const ENV_PREFIX: &str = "RUSTY_FLEET_";

// Credential policy
pub const DEFAULT_MINIMUM_PASSWORD_LENGTH: usize = 15;
pub const DEFAULT_TOKEN_EXPIRY_MINUTES: i64 = 60;
pub const MAX_TOKEN_EXPIRY_MINUTES: i64 = 60 * 24 * 365;
pub const DEFAULT_MIN_AUTH_DURATION_MS: u64 = 100;

// Argon2id defaults (OWASP recommended minimums)
pub const DEFAULT_ARGON2_MEMORY_KIB: u32 = 19_456;
pub const DEFAULT_ARGON2_ITERATIONS: u32 = 2;
pub const DEFAULT_ARGON2_PARALLELISM: u32 = 1;

// Token signing key
pub const SIGNING_KEY_FILE_NAME: &str = "signing.key";
pub const SIGNING_KEY_BYTES: usize = 64;
pub const MIN_SIGNING_KEY_BYTES: usize = 32;

// System account database
pub const DEFAULT_PASSWD_PATH: &str = "/etc/passwd";

// Bootstrap administrator
pub const ADMIN_NAME: &str = "Admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "ISolemlySwearToDeleteTheDataDirectory";

// Wire contract
pub const API_PRODUCT: &str = "RustyFleet.Api";
pub const API_VERSION: (u64, u64, u64) = (1, 0, 0);
pub const API_HEADER: &str = "api";
pub const INSTANCE_HEADER: &str = "instance";
pub const APPLICATION_JSON: &str = "application/json";
pub const MAX_REQUEST_BODY_BYTES: u64 = 16 * 1024;

// Routes
pub const USER_PATH: &str = "User";
pub const LIST_PATH: &str = "List";
