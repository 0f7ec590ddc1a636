//! # cardmill-api
//!
//! HTTP surface for the cardmill card-generation service: synchronous
//! generation, async submission, job status lookup, and health.

use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub mod error;
pub mod handlers;

pub use error::ApiError;
pub use handlers::AppState;

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically across
/// request logs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router. Middleware layers are applied by the
/// binary so tests can drive routes directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/generate", post(handlers::generate))
        .route("/generate-async", post(handlers::generate_async))
        .route("/jobs/:job_id", get(handlers::job_status))
        .with_state(state)
}
