// =============================================================================
// Application Identity
// =============================================================================

pub const APP_NAME: &str = "streamfabric";

// =============================================================================
// Environment Variables - Server
// =============================================================================

pub const ENV_HOST: &str = "FABRIC_HOST";
pub const ENV_PORT: &str = "FABRIC_PORT";
pub const ENV_LOG: &str = "FABRIC_LOG";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;

// =============================================================================
// Environment Variables - Log service client (C1)
// =============================================================================

/// Base URL of the durable log service. Required.
pub const ENV_CORE_URL: &str = "CORE_URL";

/// Bearer token required on all northbound routes, if set.
pub const ENV_AUTH_TOKEN: &str = "AUTH_TOKEN";

// =============================================================================
// Environment Variables - Sessions (C5)
// =============================================================================

pub const ENV_SESSION_TTL_SECONDS: &str = "SESSION_TTL_SECONDS";
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 1800;

// =============================================================================
// Environment Variables - Fan-out (C3/C4/C9)
// =============================================================================

pub const ENV_FANOUT_QUEUE_THRESHOLD: &str = "FANOUT_QUEUE_THRESHOLD";
pub const DEFAULT_FANOUT_QUEUE_THRESHOLD: usize = 100;

/// Presence of this var (any value) enables queued fan-out; absence forces inline.
pub const ENV_FANOUT_QUEUE: &str = "FANOUT_QUEUE";

/// Bounded parallelism for inline fan-out deliveries within one publish call.
pub const INLINE_FANOUT_PARALLELISM: usize = 32;

/// Subscribers per `sendBatch` call when queuing.
pub const FANOUT_QUEUE_BATCH_SIZE: usize = 50;

/// Max `sendBatch` calls issued per publish.
pub const FANOUT_QUEUE_MAX_BATCHES_PER_CALL: usize = 100;

pub const FANOUT_RETRY_DELAY_TRANSIENT_SECS: u64 = 5;
pub const FANOUT_RETRY_DELAY_EXCEPTION_SECS: u64 = 10;

// =============================================================================
// Environment Variables - Analytics credentials (C2/C6)
// =============================================================================

pub const ENV_ACCOUNT_ID: &str = "ACCOUNT_ID";
pub const ENV_API_TOKEN: &str = "API_TOKEN";
pub const ENV_ANALYTICS_DATASET: &str = "ANALYTICS_DATASET";

// =============================================================================
// Environment Variables - CORS
// =============================================================================

pub const ENV_CORS_ORIGINS: &str = "CORS_ORIGINS";

// =============================================================================
// Cleanup sweeper (C7)
// =============================================================================

pub const CLEANUP_BATCH_SIZE: usize = 10;
pub const CLEANUP_TICK_INTERVAL_SECS: u64 = 30;
/// I7: grace window a just-expired session gets before its streams are torn down.
pub const CLEANUP_GRACE_SECS: i64 = 60;

// =============================================================================
// Edge cache (C8)
// =============================================================================

pub const MAX_IN_FLIGHT: usize = 100_000;
pub const COALESCE_LINGER_MS: u64 = 200;

pub const CACHE_MAX_AGE_PLAIN_SECS: u64 = 60;
pub const CACHE_STALE_WHILE_REVALIDATE_SECS: u64 = 300;
pub const CACHE_MAX_AGE_LONG_POLL_SECS: u64 = 20;

pub const LONG_POLL_TIMEOUT_SECS: u64 = 20;

// =============================================================================
// Shutdown
// =============================================================================

pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Identifiers
// =============================================================================

/// Session stream path prefix: `session:{sessionId}`.
pub const SESSION_STREAM_PREFIX: &str = "session:";

/// Allowed characters in a project id, stream id, or subscriber id.
pub const IDENTIFIER_PATTERN: &str = r"^[A-Za-z0-9._:\-]+$";
