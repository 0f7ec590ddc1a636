//! Submission gateway: validate incoming requests and admit them to the
//! store and queue exactly once per request id.

use serde::Deserialize;

use cardmill_core::{
    Error, JobRecord, JobStatus, JobSubmission, JobStore, Result, WorkQueue,
};
use tracing::{debug, info};

/// Raw submission body before validation. Every field is optional at the
/// wire level; validation reports all missing required fields at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub request_id: Option<String>,
    pub session_id: Option<String>,
    pub card_id: Option<String>,
    pub persona: Option<String>,
    pub theme: Option<String>,
    pub locale: Option<String>,
    pub name: Option<String>,
    pub message: Option<String>,
}

/// Result of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub job_id: String,
    pub status: JobStatus,
    /// False when an existing record was returned instead of a new one.
    pub admitted: bool,
}

/// Check required fields, reporting every missing one in a single error.
pub fn validate(request: &SubmitRequest) -> Result<JobSubmission> {
    let mut missing = Vec::new();
    if request.card_id.as_deref().unwrap_or("").is_empty() {
        missing.push("cardId");
    }
    if request.persona.as_deref().unwrap_or("").is_empty() {
        missing.push("persona");
    }
    if request.theme.as_deref().unwrap_or("").is_empty() {
        missing.push("theme");
    }
    if request.request_id.as_deref().unwrap_or("").is_empty() {
        missing.push("requestId");
    }
    if !missing.is_empty() {
        return Err(Error::InvalidRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    Ok(JobSubmission {
        job_id: request.request_id.clone().unwrap_or_default(),
        session_id: request.session_id.clone(),
        card_id: request.card_id.clone().unwrap_or_default(),
        persona: request.persona.clone().unwrap_or_default(),
        theme: request.theme.clone().unwrap_or_default(),
        locale: request.locale.clone(),
        name: request.name.clone(),
        message: request.message.clone(),
    })
}

/// Validate and admit a submission.
///
/// The request id doubles as the job id, so a resubmission within the
/// record's lifetime returns the existing job's status without touching
/// the queue. A duplicate-identity refusal from the queue is absorbed:
/// the work is already tracked, which is exactly the desired state.
pub async fn submit(
    store: &dyn JobStore,
    queue: &dyn WorkQueue,
    request: &SubmitRequest,
) -> Result<SubmitOutcome> {
    let submission = validate(request)?;
    let job_id = submission.job_id.clone();

    if let Some(existing) = store.get(&job_id).await? {
        debug!(job_id, status = %existing.status, "Duplicate submission; returning existing job");
        return Ok(SubmitOutcome {
            job_id,
            status: existing.status,
            admitted: false,
        });
    }

    let record = store.create_or_get(JobRecord::queued(&submission)).await?;
    let admitted = record.status == JobStatus::Queued;

    match queue.enqueue(&job_id).await {
        Ok(()) => {}
        Err(Error::AlreadyQueued(_)) => {
            debug!(job_id, "Work already enqueued for this job");
        }
        Err(e) => return Err(e),
    }

    info!(job_id, card_id = %record.card_id, "Job admitted");
    Ok(SubmitOutcome {
        job_id,
        status: record.status,
        admitted,
    })
}
