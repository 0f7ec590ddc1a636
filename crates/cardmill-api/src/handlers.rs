//! Route handlers: health, synchronous generation, async submission, and
//! job status lookup.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use cardmill_core::{defaults, Error, GenerateInput, JobStore, WorkQueue};
use cardmill_jobs::{gateway, CardGenerator, StepTimings, SubmitRequest};

use crate::error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub generator: Arc<dyn CardGenerator>,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// Synchronous generation request. `msg` is an accepted alias for
/// `message`; `message` wins when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub card_id: Option<String>,
    pub persona: Option<String>,
    pub theme: Option<String>,
    pub locale: Option<String>,
    pub name: Option<String>,
    pub message: Option<String>,
    pub msg: Option<String>,
}

impl GenerateRequest {
    /// Check required fields, reporting every missing one at once.
    fn into_input(self) -> Result<GenerateInput, Error> {
        let mut missing = Vec::new();
        if self.card_id.as_deref().unwrap_or("").is_empty() {
            missing.push("cardId");
        }
        if self.persona.as_deref().unwrap_or("").is_empty() {
            missing.push("persona");
        }
        if self.theme.as_deref().unwrap_or("").is_empty() {
            missing.push("theme");
        }
        if !missing.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        Ok(GenerateInput {
            card_id: self.card_id.unwrap_or_default(),
            persona: self.persona.unwrap_or_default(),
            theme: self.theme.unwrap_or_default(),
            locale: self
                .locale
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| defaults::DEFAULT_LOCALE.to_string()),
            name: self.name.unwrap_or_default(),
            message: self.message.or(self.msg).unwrap_or_default(),
        })
    }
}

/// Run the pipeline inline and return the full result with step timings.
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = request.into_input()?;
    let mut timings = StepTimings::new();
    let output = state.generator.generate(&input, &mut timings).await?;

    let timings: serde_json::Map<String, serde_json::Value> = timings
        .iter()
        .map(|(name, ms)| (name.to_string(), json!(ms)))
        .collect();

    Ok(Json(json!({
        "status": "succeeded",
        "outputUrl": output.output_url,
        "mediaType": "image/jpeg",
        "mergeJobId": output.merge_job_id,
        "selection": output.selection,
        "dataRow": output.data_row,
        "timings": timings,
    })))
}

/// Admit a job for background processing.
///
/// A missing request id gets a generated UUID, which makes the submission
/// effectively non-idempotent; callers wanting dedup must supply their own.
pub async fn generate_async(
    State(state): State<AppState>,
    Json(mut request): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.request_id.as_deref().unwrap_or("").is_empty() {
        request.request_id = Some(Uuid::new_v4().to_string());
    }

    let outcome = gateway::submit(state.store.as_ref(), state.queue.as_ref(), &request).await?;
    info!(
        job_id = %outcome.job_id,
        status = %outcome.status,
        admitted = outcome.admitted,
        "Async generation submitted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "jobId": outcome.job_id,
            "status": outcome.status,
        })),
    ))
}

/// Fetch a job record by id.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .store
        .get(&job_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Job {job_id} not found")))?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use cardmill_core::Result;
    use cardmill_jobs::PipelineOutput;
    use cardmill_store::{InMemoryJobStore, InMemoryWorkQueue};

    struct StubGenerator {
        seen: Mutex<Option<GenerateInput>>,
        fail_with: Option<fn() -> Error>,
    }

    #[async_trait]
    impl CardGenerator for StubGenerator {
        async fn generate(
            &self,
            input: &GenerateInput,
            timings: &mut StepTimings,
        ) -> Result<PipelineOutput> {
            *self.seen.lock().await = Some(input.clone());
            timings.record(
                cardmill_jobs::step::SELECT_ASSETS,
                std::time::Duration::from_millis(1),
            );
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(PipelineOutput {
                    output_url: "https://x/out.jpg".into(),
                    merge_job_id: Some("m-1".into()),
                    ..Default::default()
                }),
            }
        }
    }

    fn app(fail_with: Option<fn() -> Error>) -> (axum::Router, Arc<StubGenerator>) {
        let generator = Arc::new(StubGenerator {
            seen: Mutex::new(None),
            fail_with,
        });
        let state = AppState {
            store: Arc::new(InMemoryJobStore::default()),
            queue: Arc::new(InMemoryWorkQueue::new()),
            generator: generator.clone(),
        };
        (crate::router(state), generator)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(None);
        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_generate_reports_all_missing_fields() {
        let (app, _) = app(None);
        let res = app
            .oneshot(post_json("/generate", json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        let message = body["error"].as_str().unwrap();
        for field in ["cardId", "persona", "theme"] {
            assert!(message.contains(field), "missing {field} in: {message}");
        }
    }

    #[tokio::test]
    async fn test_generate_success_with_timings() {
        let (app, _) = app(None);
        let res = app
            .oneshot(post_json(
                "/generate",
                json!({"cardId": "c1", "persona": "friend", "theme": "birthday"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["status"], "succeeded");
        assert_eq!(body["outputUrl"], "https://x/out.jpg");
        assert_eq!(body["mediaType"], "image/jpeg");
        assert!(body["timings"]["select_assets"].is_number());
    }

    #[tokio::test]
    async fn test_generate_msg_fallback_and_locale_default() {
        let (app, generator) = app(None);
        app.oneshot(post_json(
            "/generate",
            json!({"cardId": "c1", "persona": "friend", "theme": "birthday", "msg": "Hi"}),
        ))
        .await
        .unwrap();
        let seen = generator.seen.lock().await.clone().unwrap();
        assert_eq!(seen.message, "Hi");
        assert_eq!(seen.locale, defaults::DEFAULT_LOCALE);
        assert_eq!(seen.name, "");
    }

    #[tokio::test]
    async fn test_generate_unknown_option_is_400() {
        let (app, _) = app(Some(|| Error::UnknownOption("persona: pirate".into())));
        let res = app
            .oneshot(post_json(
                "/generate",
                json!({"cardId": "c1", "persona": "pirate", "theme": "birthday"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_upstream_is_502() {
        let (app, _) = app(Some(|| Error::Upstream("503 from storage".into())));
        let res = app
            .oneshot(post_json(
                "/generate",
                json!({"cardId": "c1", "persona": "friend", "theme": "birthday"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_async_submit_accepted_with_supplied_id() {
        let (app, _) = app(None);
        let res = app
            .oneshot(post_json(
                "/generate-async",
                json!({
                    "requestId": "req-1",
                    "cardId": "c1",
                    "persona": "friend",
                    "theme": "birthday"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let body = body_json(res).await;
        assert_eq!(body["jobId"], "req-1");
        assert_eq!(body["status"], "queued");
    }

    #[tokio::test]
    async fn test_async_submit_generates_request_id_when_absent() {
        let (app, _) = app(None);
        let res = app
            .oneshot(post_json(
                "/generate-async",
                json!({"cardId": "c1", "persona": "friend", "theme": "birthday"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let body = body_json(res).await;
        assert!(!body["jobId"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_status_roundtrip_and_404() {
        let (app, _) = app(None);

        let res = app
            .clone()
            .oneshot(Request::get("/jobs/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        app.clone()
            .oneshot(post_json(
                "/generate-async",
                json!({
                    "requestId": "req-1",
                    "cardId": "c1",
                    "persona": "friend",
                    "theme": "birthday"
                }),
            ))
            .await
            .unwrap();

        let res = app
            .oneshot(Request::get("/jobs/req-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["jobId"], "req-1");
        assert_eq!(body["cardId"], "c1");
        assert_eq!(body["status"], "queued");
    }
}
