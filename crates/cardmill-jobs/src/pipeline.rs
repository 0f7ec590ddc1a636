//! The ten-step card generation pipeline.
//!
//! Stateless orchestration of the external workflow: asset selection →
//! data-file build → upload → presign → merge submit → poll → result
//! extraction. Takes explicit parameters and returns a result or a labeled
//! failure; every executed step is timed under a stable name.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};

use cardmill_core::{
    defaults, AssetStore, Catalog, Error, GenerateInput, MergeService, MergeSubmission, Result,
};

use crate::datarow::{self, DataRow};
use crate::merge_build::{self, PresignedAsset};
use crate::selection::{self, Selection};
use crate::timing::{step, timed, StepTimings};

/// Anything that can run a generation for a set of parameters.
///
/// The dispatcher and the synchronous route both work through this seam;
/// `GeneratePipeline` is the production implementation.
#[async_trait]
pub trait CardGenerator: Send + Sync {
    async fn generate(
        &self,
        input: &GenerateInput,
        timings: &mut StepTimings,
    ) -> Result<PipelineOutput>;
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Optional key prefix for uploaded data files.
    pub data_file_prefix: Option<String>,
    /// Destination directory for template fonts.
    pub font_dir: String,
    /// Sleep between merge status polls.
    pub poll_interval: Duration,
    /// Overall merge polling deadline.
    pub poll_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            data_file_prefix: None,
            font_dir: defaults::FONT_DEST_DIR.to_string(),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            poll_timeout: Duration::from_millis(defaults::POLL_TIMEOUT_MS),
        }
    }
}

/// What was chosen for a run, reported back to synchronous callers.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSummary {
    pub card_id: String,
    pub persona: String,
    pub theme: String,
    pub locale: String,
    pub ornament: String,
    pub background: String,
    pub template: TemplateSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub asset_key: String,
    pub fonts: Vec<String>,
}

/// Successful pipeline result.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub output_url: String,
    pub merge_job_id: Option<String>,
    pub selection: SelectionSummary,
    pub data_row: DataRow,
    pub data_file_key: String,
}

/// The production pipeline over real collaborators.
pub struct GeneratePipeline {
    catalog: Arc<Catalog>,
    assets: Arc<dyn AssetStore>,
    merge: Arc<dyn MergeService>,
    settings: PipelineSettings,
}

impl GeneratePipeline {
    pub fn new(
        catalog: Arc<Catalog>,
        assets: Arc<dyn AssetStore>,
        merge: Arc<dyn MergeService>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            catalog,
            assets,
            merge,
            settings,
        }
    }

    /// Fetch merge status until terminal or the deadline elapses.
    ///
    /// The terminal check runs before the elapsed check each iteration, so
    /// a terminal result observed exactly at the boundary is still
    /// returned rather than timed out.
    async fn poll_until_terminal(&self, status_url: &str, token: &str) -> Result<Value> {
        let start = Instant::now();
        loop {
            let doc = self.merge.fetch_status(status_url, token).await?;
            let status = doc.get("status").and_then(Value::as_str).unwrap_or_default();
            if status == "succeeded" || status == "failed" {
                return Ok(doc);
            }
            if start.elapsed() > self.settings.poll_timeout {
                return Err(Error::Timeout("Job polling timed out".to_string()));
            }
            debug!(status, "Merge job not terminal yet");
            sleep(self.settings.poll_interval).await;
        }
    }
}

/// The first output entry must carry a destination URL.
fn extract_output_url(submission: &MergeSubmission, result: &Value) -> Result<String> {
    result
        .get("outputs")
        .and_then(|o| o.get(0))
        .and_then(|o| o.get("destination"))
        .and_then(|d| d.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::MergeOutput {
            message: "No output URL returned from merge result".to_string(),
            details: serde_json::json!({ "job": submission, "result": result }),
        })
}

#[async_trait]
impl CardGenerator for GeneratePipeline {
    async fn generate(
        &self,
        input: &GenerateInput,
        timings: &mut StepTimings,
    ) -> Result<PipelineOutput> {
        let selection: Selection = timed(timings, step::SELECT_ASSETS, async {
            selection::select_assets(&self.catalog, input)
        })
        .await?;

        let row = timed(timings, step::BUILD_DATA_ROW, async {
            Ok(datarow::build_data_row(&selection, &input.name, &input.message))
        })
        .await?;

        let data_file_key = datarow::data_file_key(self.settings.data_file_prefix.as_deref());
        let content_type = datarow::guess_content_type(&data_file_key);

        let bytes = timed(timings, step::SERIALIZE_DATA_ROW, async {
            datarow::serialize_data_row(&row)
        })
        .await?;

        timed(timings, step::UPLOAD_DATA_FILE, async {
            let location = self.assets.request_upload_location(&data_file_key).await?;
            self.assets
                .transfer_bytes(&location, bytes, &content_type)
                .await
        })
        .await?;

        let targets = merge_build::presign_targets(&selection, &data_file_key);
        let presigned = timed(timings, step::PRESIGN_ASSETS, async {
            let urls = futures::future::try_join_all(
                targets
                    .iter()
                    .map(|t| self.assets.request_download_url(&t.asset_key)),
            )
            .await?;
            Ok(targets
                .into_iter()
                .zip(urls)
                .map(|(t, url)| PresignedAsset {
                    kind: t.kind,
                    asset_key: t.asset_key,
                    url,
                })
                .collect::<Vec<_>>())
        })
        .await?;

        let request = timed(timings, step::BUILD_MERGE_REQUEST, async {
            merge_build::build_merge_request(
                &selection,
                &data_file_key,
                &presigned,
                &self.settings.font_dir,
            )
        })
        .await?;

        let token = timed(timings, step::AUTHENTICATE, self.merge.authenticate()).await?;

        let submission = timed(
            timings,
            step::SUBMIT_MERGE,
            self.merge.submit(&request, &token),
        )
        .await?;

        let result = timed(
            timings,
            step::POLL_MERGE_STATUS,
            self.poll_until_terminal(&submission.status_url, &token),
        )
        .await?;

        let output_url = timed(timings, step::EXTRACT_OUTPUT, async {
            extract_output_url(&submission, &result)
        })
        .await?;

        info!(
            card_id = %input.card_id,
            persona = %input.persona,
            theme = %input.theme,
            locale = %input.locale,
            merge_job_id = ?submission.job_id,
            "Card generation pipeline succeeded"
        );

        Ok(PipelineOutput {
            output_url,
            merge_job_id: submission.job_id.clone(),
            selection: SelectionSummary {
                card_id: input.card_id.clone(),
                persona: input.persona.clone(),
                theme: input.theme.clone(),
                locale: input.locale.clone(),
                ornament: selection.ornament.clone(),
                background: selection.background.clone(),
                template: TemplateSummary {
                    asset_key: selection.template.asset_key.clone(),
                    fonts: selection.template.fonts.clone(),
                },
            },
            data_row: row,
            data_file_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    use cardmill_core::{MergeRequest, MergeSubmission};
    use serde_json::json;

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            serde_json::from_value(json!({
                "cards": [{
                    "cardId": "c1",
                    "personas": {
                        "fieldTag": "Icon",
                        "options": [{"name": "friend", "assets": ["o1.png"]}]
                    },
                    "themes": {
                        "fieldTag": "Background",
                        "options": [{"name": "birthday", "assets": ["b1.png"]}]
                    },
                    "templates": [
                        {"locale": "en", "assetKey": "t_en.indd"},
                        {"locale": "ar", "assetKey": "t1.indd", "fonts": ["f1.ttf"]}
                    ]
                }]
            }))
            .unwrap(),
        )
    }

    fn input() -> GenerateInput {
        GenerateInput {
            card_id: "c1".into(),
            persona: "friend".into(),
            theme: "birthday".into(),
            locale: "ar".into(),
            name: "Sam".into(),
            message: "Hi".into(),
        }
    }

    #[derive(Default)]
    struct MockAssetStore {
        uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
        fail_presign_for: Option<String>,
    }

    #[async_trait]
    impl AssetStore for MockAssetStore {
        async fn request_upload_location(&self, asset_key: &str) -> Result<String> {
            Ok(format!("https://upload/{asset_key}"))
        }

        async fn transfer_bytes(
            &self,
            location: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<()> {
            self.uploads
                .lock()
                .await
                .push((location.to_string(), content_type.to_string(), bytes));
            Ok(())
        }

        async fn request_download_url(&self, asset_key: &str) -> Result<String> {
            if self.fail_presign_for.as_deref() == Some(asset_key) {
                return Err(Error::Upstream(format!("presign refused: {asset_key}")));
            }
            Ok(format!("https://signed/{asset_key}"))
        }
    }

    #[derive(Default)]
    struct MockMergeService {
        submissions: Mutex<Vec<MergeRequest>>,
        statuses: Mutex<VecDeque<Value>>,
        fail_auth: bool,
    }

    impl MockMergeService {
        fn with_statuses(statuses: Vec<Value>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MergeService for MockMergeService {
        async fn authenticate(&self) -> Result<String> {
            if self.fail_auth {
                return Err(Error::Upstream("Token request failed: 401".into()));
            }
            Ok("tok".to_string())
        }

        async fn submit(&self, request: &MergeRequest, _token: &str) -> Result<MergeSubmission> {
            self.submissions.lock().await.push(request.clone());
            Ok(MergeSubmission {
                job_id: Some("m-1".into()),
                status_url: "https://merge/status/m-1".into(),
                cancel_url: Some("https://merge/cancel/m-1".into()),
            })
        }

        async fn fetch_status(&self, _status_url: &str, _token: &str) -> Result<Value> {
            Ok(self
                .statuses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| json!({"status": "running"})))
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            poll_interval: Duration::from_millis(1),
            poll_timeout: Duration::from_millis(250),
            ..Default::default()
        }
    }

    fn pipeline(
        assets: Arc<MockAssetStore>,
        merge: Arc<MockMergeService>,
        settings: PipelineSettings,
    ) -> GeneratePipeline {
        GeneratePipeline::new(catalog(), assets, merge, settings)
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let assets = Arc::new(MockAssetStore::default());
        let merge = Arc::new(MockMergeService::with_statuses(vec![json!({
            "status": "succeeded",
            "outputs": [{"destination": {"url": "https://x/out.jpg"}}]
        })]));
        let pipeline = pipeline(assets.clone(), merge.clone(), settings());

        let mut timings = StepTimings::new();
        let output = pipeline.generate(&input(), &mut timings).await.unwrap();

        assert_eq!(output.output_url, "https://x/out.jpg");
        assert_eq!(output.merge_job_id.as_deref(), Some("m-1"));
        assert_eq!(output.data_row.values[0], "b1.png");
        assert_eq!(output.data_row.values[1], "o1.png");

        // background, ornament, template, data file, one font
        let submissions = merge.submissions.lock().await;
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].assets.len(), 5);

        // uploaded CSV carries the guessed content type
        let uploads = assets.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, "text/csv");

        // all ten steps timed
        assert_eq!(timings.len(), 10);
        assert!(timings.get(step::EXTRACT_OUTPUT).is_some());
    }

    #[tokio::test]
    async fn test_failure_stops_timings_at_failing_step() {
        let assets = Arc::new(MockAssetStore {
            fail_presign_for: Some("b1.png".into()),
            ..Default::default()
        });
        let merge = Arc::new(MockMergeService::default());
        let pipeline = pipeline(assets, merge, settings());

        let mut timings = StepTimings::new();
        let err = pipeline.generate(&input(), &mut timings).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));

        // steps 1..5 timed, nothing beyond the failing presign
        assert_eq!(timings.len(), 5);
        assert!(timings.get(step::PRESIGN_ASSETS).is_some());
        assert!(timings.get(step::BUILD_MERGE_REQUEST).is_none());
        assert!(timings.get(step::AUTHENTICATE).is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_timed() {
        let assets = Arc::new(MockAssetStore::default());
        let merge = Arc::new(MockMergeService {
            fail_auth: true,
            ..Default::default()
        });
        let pipeline = pipeline(assets, merge, settings());

        let mut timings = StepTimings::new();
        let err = pipeline.generate(&input(), &mut timings).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(timings.len(), 7);
        assert!(timings.get(step::AUTHENTICATE).is_some());
        assert!(timings.get(step::SUBMIT_MERGE).is_none());
    }

    #[tokio::test]
    async fn test_terminal_at_deadline_boundary_wins() {
        let assets = Arc::new(MockAssetStore::default());
        let merge = Arc::new(MockMergeService::with_statuses(vec![json!({
            "status": "succeeded",
            "outputs": [{"destination": {"url": "https://x/out.jpg"}}]
        })]));
        // zero deadline: the terminal check still runs first
        let pipeline = pipeline(
            assets,
            merge,
            PipelineSettings {
                poll_timeout: Duration::ZERO,
                poll_interval: Duration::from_millis(1),
                ..Default::default()
            },
        );

        let mut timings = StepTimings::new();
        let output = pipeline.generate(&input(), &mut timings).await.unwrap();
        assert_eq!(output.output_url, "https://x/out.jpg");
    }

    #[tokio::test]
    async fn test_poll_deadline_exceeded_is_timeout() {
        let assets = Arc::new(MockAssetStore::default());
        // never terminal
        let merge = Arc::new(MockMergeService::default());
        let pipeline = pipeline(
            assets,
            merge,
            PipelineSettings {
                poll_timeout: Duration::from_millis(10),
                poll_interval: Duration::from_millis(1),
                ..Default::default()
            },
        );

        let mut timings = StepTimings::new();
        let err = pipeline.generate(&input(), &mut timings).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(timings.get(step::POLL_MERGE_STATUS).is_some());
        assert!(timings.get(step::EXTRACT_OUTPUT).is_none());
    }

    #[tokio::test]
    async fn test_failed_merge_without_outputs_is_shape_error() {
        let assets = Arc::new(MockAssetStore::default());
        let merge = Arc::new(MockMergeService::with_statuses(vec![json!({
            "status": "failed",
            "errors": [{"code": "RENDER"}]
        })]));
        let pipeline = pipeline(assets, merge, settings());

        let mut timings = StepTimings::new();
        let err = pipeline.generate(&input(), &mut timings).await.unwrap_err();
        let details = err.details().expect("diagnostic context");
        assert_eq!(details["result"]["status"], "failed");
        assert_eq!(details["job"]["statusUrl"], "https://merge/status/m-1");
        // polling completed; extraction is the failing step
        assert_eq!(timings.len(), 10);
    }
}
