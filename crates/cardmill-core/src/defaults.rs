//! Centralized default constants for the cardmill system.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8080;

/// Maximum accepted request body size in bytes.
pub const BODY_LIMIT_BYTES: usize = 4 * 1024 * 1024;

// =============================================================================
// JOB STORE
// =============================================================================

/// Key prefix for job record hashes.
pub const JOB_KEY_PREFIX: &str = "job:";

/// Expiry horizon for job records in seconds. Callers must poll within
/// this window; expired jobs are unrecoverable.
pub const JOB_TTL_SECONDS: u64 = 86_400;

/// Maximum stored length of an error detail excerpt.
pub const ERROR_DETAIL_MAX_CHARS: usize = 4_000;

// =============================================================================
// WORK QUEUE
// =============================================================================

/// Default queue namespace.
pub const QUEUE_NAME: &str = "cardmill";

/// Completed work identities retained before the oldest is evicted.
pub const QUEUE_COMPLETED_RETAIN: usize = 1_000;

/// Failed work identities retained before the oldest is evicted.
pub const QUEUE_FAILED_RETAIN: usize = 5_000;

// =============================================================================
// DISPATCHER
// =============================================================================

/// Default number of concurrently processed work items.
pub const WORKER_CONCURRENCY: u32 = 5;

/// Concurrency clamp bounds.
pub const WORKER_CONCURRENCY_MIN: u32 = 1;
pub const WORKER_CONCURRENCY_MAX: u32 = 50;

/// Default throughput limit: operations per window.
pub const LIMITER_MAX_OPS: u32 = 150;

/// Throughput operation clamp bounds.
pub const LIMITER_MAX_OPS_MIN: u32 = 1;
pub const LIMITER_MAX_OPS_MAX: u32 = 10_000;

/// Default throughput window in milliseconds.
pub const LIMITER_WINDOW_MS: u64 = 60_000;

/// Throughput window clamp bounds in milliseconds.
pub const LIMITER_WINDOW_MS_MIN: u64 = 1_000;
pub const LIMITER_WINDOW_MS_MAX: u64 = 600_000;

/// Polling interval when the queue is empty, in milliseconds.
pub const QUEUE_POLL_INTERVAL_MS: u64 = 500;

// =============================================================================
// RETRY
// =============================================================================

/// Maximum delivery attempts per work item.
pub const MAX_ATTEMPTS: u32 = 3;

/// Base retry backoff in milliseconds; doubles per attempt (3s, 6s, 12s).
pub const BACKOFF_BASE_MS: u64 = 3_000;

// =============================================================================
// MERGE SERVICE
// =============================================================================

/// Interval between merge status polls, in milliseconds.
pub const POLL_INTERVAL_MS: u64 = 2_000;

/// Overall merge polling deadline, in milliseconds.
pub const POLL_TIMEOUT_MS: u64 = 120_000;

/// Destination directory for template fonts inside the merge sandbox.
pub const FONT_DEST_DIR: &str = "fonts";

/// HTTP client timeout for external service calls, in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Default locale when a request does not specify one.
pub const DEFAULT_LOCALE: &str = "ar";
