//! Trait seams between components.
//!
//! Every external collaborator — the job record store, the durable queue,
//! asset storage, and the merge service — sits behind one of these traits so
//! implementations can be substituted (Redis vs in-memory, HTTP vs mock)
//! without touching the orchestration code.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    JobPatch, JobRecord, MergeRequest, MergeSubmission, SettleOutcome, WorkItem,
};

/// Durable key/value record of job lifecycle state, keyed by job id, with
/// an expiry horizon.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a Queued record with an expiry horizon, or return the
    /// existing record unchanged (idempotent create).
    async fn create_or_get(&self, record: JobRecord) -> Result<JobRecord>;

    /// Merge the patch into an existing record, refreshing the updated
    /// timestamp. A missing or expired record is left untouched; the
    /// expiry horizon is not refreshed.
    async fn update(&self, job_id: &str, patch: JobPatch) -> Result<()>;

    /// Fetch a record. Returns `Ok(None)` when absent; never an error for
    /// not-found.
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>>;
}

/// At-least-once work queue with per-item idempotent identity.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue work for a job. Fails with `Error::AlreadyQueued` when an
    /// item with the same identity is already tracked.
    async fn enqueue(&self, job_id: &str) -> Result<()>;

    /// Claim the next ready item, incrementing its delivery attempt.
    /// Due delayed items are promoted before the pending list is popped.
    async fn claim_next(&self) -> Result<Option<WorkItem>>;

    /// Schedule a claimed item for redelivery after `delay`.
    async fn requeue(&self, item: &WorkItem, delay: Duration) -> Result<()>;

    /// Terminally settle a claimed item, recording it in the bounded
    /// completed/failed history.
    async fn settle(&self, item: &WorkItem, outcome: SettleOutcome) -> Result<()>;
}

/// Asset storage provider: presigned uploads and downloads.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Request an upload location for the given asset key.
    async fn request_upload_location(&self, asset_key: &str) -> Result<String>;

    /// Transfer bytes to a previously requested upload location.
    async fn transfer_bytes(
        &self,
        location: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;

    /// Request a short-lived retrieval URL for a stored asset.
    async fn request_download_url(&self, asset_key: &str) -> Result<String>;
}

/// Remote document merge service plus its identity provider.
#[async_trait]
pub trait MergeService: Send + Sync {
    /// Client-credentials token exchange. Fails when the call is
    /// unsuccessful or the response lacks a token.
    async fn authenticate(&self) -> Result<String>;

    /// Submit a merge job. Fails when the call is unsuccessful or the
    /// response lacks a status URL.
    async fn submit(&self, request: &MergeRequest, token: &str) -> Result<MergeSubmission>;

    /// Fetch the current status document for a submitted merge job.
    /// The polling loop itself lives in the pipeline.
    async fn fetch_status(&self, status_url: &str, token: &str) -> Result<serde_json::Value>;
}
