//! Structured logging field name constants for cardmill.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, retry scheduled |
//! | INFO  | Lifecycle events, job transitions, operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |

/// Correlation ID propagated across request → job → external calls.
pub const REQUEST_ID: &str = "request_id";

/// Job id being processed.
pub const JOB_ID: &str = "job_id";

/// Session correlation id supplied by the client.
pub const SESSION_ID: &str = "session_id";

/// Card id being generated.
pub const CARD_ID: &str = "card_id";

/// 1-based delivery attempt number.
pub const ATTEMPT: &str = "attempt";

/// Job lifecycle status after a transition.
pub const STATUS: &str = "status";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Pipeline step name.
pub const STEP: &str = "step";

/// Remote merge service job id.
pub const MERGE_JOB_ID: &str = "merge_job_id";
