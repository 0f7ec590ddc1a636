//! Shared data model for cardmill: job records, work items, and the merge
//! service wire types.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle state of a card-generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
    Retrying,
}

impl JobStatus {
    /// The stored string form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "retrying" => Ok(JobStatus::Retrying),
            other => Err(Error::Serialization(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of a job's lifecycle, stored as a string-field hash.
///
/// Every value is coerced to its string form on write; absent optional
/// values are stored as empty strings, never null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub session_id: String,
    pub card_id: String,
    pub persona: String,
    pub theme: String,
    pub locale: String,
    pub name: String,
    pub message: String,
    pub status: JobStatus,
    /// Creation time, unix milliseconds.
    pub created_at: String,
    /// Last update time, unix milliseconds.
    pub updated_at: String,
    pub attempts_made: String,
    pub error: String,
    pub error_detail: String,
    pub output_url: String,
    pub merge_job_id: String,
}

impl JobRecord {
    /// Build a fresh Queued record from a submission.
    pub fn queued(submission: &JobSubmission) -> Self {
        let now = Utc::now().timestamp_millis().to_string();
        Self {
            job_id: submission.job_id.clone(),
            session_id: submission.session_id.clone().unwrap_or_default(),
            card_id: submission.card_id.clone(),
            persona: submission.persona.clone(),
            theme: submission.theme.clone(),
            locale: submission.locale.clone().unwrap_or_default(),
            name: submission.name.clone().unwrap_or_default(),
            message: submission.message.clone().unwrap_or_default(),
            status: JobStatus::Queued,
            created_at: now.clone(),
            updated_at: now,
            attempts_made: String::new(),
            error: String::new(),
            error_detail: String::new(),
            output_url: String::new(),
            merge_job_id: String::new(),
        }
    }

    /// Flatten into (field, value) pairs for hash storage.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("jobId".into(), self.job_id.clone()),
            ("sessionId".into(), self.session_id.clone()),
            ("cardId".into(), self.card_id.clone()),
            ("persona".into(), self.persona.clone()),
            ("theme".into(), self.theme.clone()),
            ("locale".into(), self.locale.clone()),
            ("name".into(), self.name.clone()),
            ("message".into(), self.message.clone()),
            ("status".into(), self.status.as_str().into()),
            ("createdAt".into(), self.created_at.clone()),
            ("updatedAt".into(), self.updated_at.clone()),
            ("attemptsMade".into(), self.attempts_made.clone()),
            ("error".into(), self.error.clone()),
            ("errorDetail".into(), self.error_detail.clone()),
            ("outputUrl".into(), self.output_url.clone()),
            ("mergeJobId".into(), self.merge_job_id.clone()),
        ]
    }

    /// Reconstruct from stored hash fields.
    pub fn from_fields(mut fields: HashMap<String, String>) -> Result<Self> {
        let status_raw = fields
            .remove("status")
            .unwrap_or_else(|| "queued".to_string());
        let mut take = |k: &str| fields.remove(k).unwrap_or_default();
        Ok(Self {
            job_id: take("jobId"),
            session_id: take("sessionId"),
            card_id: take("cardId"),
            persona: take("persona"),
            theme: take("theme"),
            locale: take("locale"),
            name: take("name"),
            message: take("message"),
            status: status_raw.parse()?,
            created_at: take("createdAt"),
            updated_at: take("updatedAt"),
            attempts_made: take("attemptsMade"),
            error: take("error"),
            error_detail: take("errorDetail"),
            output_url: take("outputUrl"),
            merge_job_id: take("mergeJobId"),
        })
    }
}

/// A validated submission accepted by the gateway.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    /// Externally supplied idempotency key; doubles as the job id.
    pub job_id: String,
    pub session_id: Option<String>,
    pub card_id: String,
    pub persona: String,
    pub theme: String,
    pub locale: Option<String>,
    pub name: Option<String>,
    pub message: Option<String>,
}

/// Partial update applied to a stored job record.
///
/// Only set fields are written; `updated_at` is always refreshed by the
/// store.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub attempts_made: Option<u32>,
    pub error: Option<String>,
    pub error_detail: Option<String>,
    pub output_url: Option<String>,
    pub merge_job_id: Option<String>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts_made = Some(attempts);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn with_output_url(mut self, url: impl Into<String>) -> Self {
        self.output_url = Some(url.into());
        self
    }

    pub fn with_merge_job_id(mut self, id: impl Into<String>) -> Self {
        self.merge_job_id = Some(id.into());
        self
    }

    /// Flatten set fields into (field, value) pairs, coercing every value
    /// to its string form.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        if let Some(status) = self.status {
            fields.push(("status".to_string(), status.as_str().to_string()));
        }
        if let Some(attempts) = self.attempts_made {
            fields.push(("attemptsMade".to_string(), attempts.to_string()));
        }
        if let Some(ref error) = self.error {
            fields.push(("error".to_string(), error.clone()));
        }
        if let Some(ref detail) = self.error_detail {
            fields.push(("errorDetail".to_string(), detail.clone()));
        }
        if let Some(ref url) = self.output_url {
            fields.push(("outputUrl".to_string(), url.clone()));
        }
        if let Some(ref id) = self.merge_job_id {
            fields.push(("mergeJobId".to_string(), id.clone()));
        }
        fields
    }
}

/// A claimed unit of work pulled from the durable queue.
///
/// The queue identity is the job id itself, so racing duplicate
/// submissions cannot double-enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub job_id: String,
    /// 1-based delivery attempt number.
    pub attempt: u32,
}

/// Terminal disposition of a claimed work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Completed,
    Failed,
}

/// Parameters of a generation run, independent of any job record.
#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub card_id: String,
    pub persona: String,
    pub theme: String,
    pub locale: String,
    pub name: String,
    pub message: String,
}

impl GenerateInput {
    /// Rehydrate pipeline parameters from a stored job record.
    pub fn from_record(record: &JobRecord) -> Self {
        let locale = if record.locale.is_empty() {
            crate::defaults::DEFAULT_LOCALE.to_string()
        } else {
            record.locale.clone()
        };
        Self {
            card_id: record.card_id.clone(),
            persona: record.persona.clone(),
            theme: record.theme.clone(),
            locale,
            name: record.name.clone(),
            message: record.message.clone(),
        }
    }
}

// =============================================================================
// MERGE SERVICE WIRE TYPES
// =============================================================================

/// One asset transferred into the merge sandbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeAsset {
    pub destination: String,
    pub source: AssetSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetSource {
    pub url: String,
}

/// Fixed merge parameters sent with every submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeParams {
    pub data_source: String,
    pub image_placement_options: ImagePlacementOptions,
    pub export_settings: ExportSettings,
    pub output_media_type: String,
    pub target_document: String,
    pub general_settings: GeneralSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePlacementOptions {
    pub fitting_option: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    pub quality: String,
    pub resolution: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    pub fonts: FontSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontSettings {
    pub fonts_directories: Vec<String>,
}

/// Full merge submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub assets: Vec<MergeAsset>,
    pub params: MergeParams,
}

/// Acknowledgement returned by the merge service on submit.
///
/// `cancel_url` is captured for completeness; cancellation is deadline-only
/// and the handle is never exercised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSubmission {
    #[serde(default)]
    pub job_id: Option<String>,
    pub status_url: String,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> JobSubmission {
        JobSubmission {
            job_id: "req-1".into(),
            session_id: None,
            card_id: "c1".into(),
            persona: "friend".into(),
            theme: "birthday".into(),
            locale: Some("ar".into()),
            name: Some("Sam".into()),
            message: Some("Hi".into()),
        }
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Retrying,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("halted".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_queued_record_defaults_to_empty_strings() {
        let mut s = submission();
        s.session_id = None;
        s.name = None;
        let record = JobRecord::queued(&s);
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.session_id, "");
        assert_eq!(record.name, "");
        assert_eq!(record.output_url, "");
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_record_field_roundtrip() {
        let record = JobRecord::queued(&submission());
        let fields: HashMap<String, String> = record.to_fields().into_iter().collect();
        let back = JobRecord::from_fields(fields).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_patch_coerces_to_strings() {
        let patch = JobPatch::status(JobStatus::Retrying)
            .with_attempts(2)
            .with_error("boom");
        let fields = patch.to_fields();
        assert!(fields.contains(&("status".to_string(), "retrying".to_string())));
        assert!(fields.contains(&("attemptsMade".to_string(), "2".to_string())));
        assert!(fields.contains(&("error".to_string(), "boom".to_string())));
        // unset fields are not written
        assert!(!fields.iter().any(|(k, _)| k == "outputUrl"));
    }

    #[test]
    fn test_generate_input_locale_fallback() {
        let mut record = JobRecord::queued(&submission());
        record.locale = String::new();
        let input = GenerateInput::from_record(&record);
        assert_eq!(input.locale, crate::defaults::DEFAULT_LOCALE);
    }

    #[test]
    fn test_merge_params_wire_casing() {
        let params = MergeParams {
            data_source: "merge_1.csv".into(),
            image_placement_options: ImagePlacementOptions {
                fitting_option: "honor_existing_style".into(),
            },
            export_settings: ExportSettings {
                quality: "maximum".into(),
                resolution: 72,
            },
            output_media_type: "image/jpeg".into(),
            target_document: "t1.indd".into(),
            general_settings: GeneralSettings {
                fonts: FontSettings {
                    fonts_directories: vec!["fonts".into()],
                },
            },
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["dataSource"], "merge_1.csv");
        assert_eq!(
            value["imagePlacementOptions"]["fittingOption"],
            "honor_existing_style"
        );
        assert_eq!(value["generalSettings"]["fonts"]["fontsDirectories"][0], "fonts");
    }

    #[test]
    fn test_merge_submission_optional_fields() {
        let parsed: MergeSubmission =
            serde_json::from_str(r#"{"statusUrl": "https://merge/status/1"}"#).unwrap();
        assert_eq!(parsed.status_url, "https://merge/status/1");
        assert!(parsed.job_id.is_none());
        assert!(parsed.cancel_url.is_none());
    }
}
