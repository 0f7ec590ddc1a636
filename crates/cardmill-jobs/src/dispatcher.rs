//! Dispatcher: claims queued work and drives the generation pipeline.
//!
//! Claims up to `concurrency` items at a time and processes them
//! concurrently. A shared rate limiter spreads pipeline starts across the
//! configured throughput window. Only sleeps when the queue is empty.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use cardmill_core::{
    defaults, Error, GenerateInput, JobPatch, JobStatus, JobStore, Result,
    SettleOutcome, WorkItem, WorkQueue,
};

use crate::pipeline::CardGenerator;
use crate::retry::RetryPolicy;
use crate::timing::StepTimings;

/// Direct-quota limiter shared by all in-flight work.
type ThroughputLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Dispatcher tuning knobs. Callers are expected to pass values already
/// clamped by the configuration layer.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Work items processed concurrently.
    pub concurrency: u32,
    /// Pipeline starts allowed per limiter window.
    pub limiter_max_ops: u32,
    /// Throughput limiter window.
    pub limiter_window: Duration,
    /// Sleep between queue polls when no work is ready.
    pub idle_poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::WORKER_CONCURRENCY,
            limiter_max_ops: defaults::LIMITER_MAX_OPS,
            limiter_window: Duration::from_millis(defaults::LIMITER_WINDOW_MS),
            idle_poll_interval: Duration::from_millis(defaults::QUEUE_POLL_INTERVAL_MS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Handle for controlling a running dispatcher.
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl DispatcherHandle {
    /// Signal the dispatcher to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }
}

/// Claims work items and runs the pipeline for each.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    generator: Arc<dyn CardGenerator>,
    config: DispatcherConfig,
    limiter: Arc<ThroughputLimiter>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        generator: Arc<dyn CardGenerator>,
        config: DispatcherConfig,
    ) -> Self {
        let burst = NonZeroU32::new(config.limiter_max_ops).unwrap_or(NonZeroU32::MIN);
        let per_op = config
            .limiter_window
            .checked_div(burst.get())
            .unwrap_or(Duration::from_millis(1));
        let quota = Quota::with_period(per_op)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            store,
            queue,
            generator,
            config,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Start the dispatcher and return a handle for control.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let dispatcher = Arc::new(self);

        tokio::spawn(async move {
            dispatcher.run(&mut shutdown_rx).await;
        });

        DispatcherHandle { shutdown_tx }
    }

    async fn run(self: &Arc<Self>, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(
            concurrency = self.config.concurrency,
            limiter_max_ops = self.config.limiter_max_ops,
            limiter_window_ms = self.config.limiter_window.as_millis() as u64,
            "Dispatcher started"
        );

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Dispatcher received shutdown signal");
                break;
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..self.config.concurrency {
                match self.claim().await {
                    Some(item) => {
                        claimed += 1;
                        let dispatcher = Arc::clone(self);
                        tasks.spawn(async move {
                            dispatcher.process(item).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Dispatcher received shutdown signal");
                        break;
                    }
                    _ = sleep(self.config.idle_poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing work batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Work task panicked");
                    }
                }
            }
        }

        info!("Dispatcher stopped");
    }

    async fn claim(&self) -> Option<WorkItem> {
        match self.queue.claim_next().await {
            Ok(item) => item,
            Err(e) => {
                error!(error = ?e, "Failed to claim work");
                None
            }
        }
    }

    /// Process one claimed work item end to end.
    ///
    /// The record is marked Processing before the pipeline runs; a record
    /// missing at this point is unrecoverable data loss, settled Failed
    /// with nowhere to report the failure.
    pub async fn process(&self, item: WorkItem) {
        self.limiter.until_ready().await;

        let job_id = item.job_id.as_str();
        let patch = JobPatch::status(JobStatus::Processing).with_attempts(item.attempt);
        if let Err(e) = self.store.update(job_id, patch).await {
            warn!(job_id, error = %e, "Failed to mark job processing");
        }

        let record = match self.store.get(job_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                error!(
                    job_id,
                    attempt = item.attempt,
                    "Job record missing at dispatch; settling without status update"
                );
                if let Err(e) = self.queue.settle(&item, SettleOutcome::Failed).await {
                    warn!(job_id, error = %e, "Failed to settle lost job");
                }
                return;
            }
            Err(e) => {
                self.handle_failure(&item, e).await;
                return;
            }
        };

        info!(
            job_id,
            attempt = item.attempt,
            card_id = %record.card_id,
            "Processing job"
        );

        let input = GenerateInput::from_record(&record);
        let mut timings = StepTimings::new();
        match self.generator.generate(&input, &mut timings).await {
            Ok(output) => {
                let patch = JobPatch::status(JobStatus::Succeeded)
                    .with_output_url(output.output_url.clone())
                    .with_merge_job_id(output.merge_job_id.clone().unwrap_or_default());
                if let Err(e) = self.store.update(job_id, patch).await {
                    warn!(job_id, error = %e, "Failed to record success");
                }
                if let Err(e) = self.queue.settle(&item, SettleOutcome::Completed).await {
                    warn!(job_id, error = %e, "Failed to settle completed job");
                }
                info!(
                    job_id,
                    attempt = item.attempt,
                    output_url = %output.output_url,
                    "Job succeeded"
                );
            }
            Err(err) => self.handle_failure(&item, err).await,
        }
    }

    async fn handle_failure(&self, item: &WorkItem, err: Error) {
        let job_id = item.job_id.as_str();
        let detail: String = format!("{err:?}")
            .chars()
            .take(defaults::ERROR_DETAIL_MAX_CHARS)
            .collect();

        if self.config.retry.should_retry(item.attempt, err.kind()) {
            let delay = self.config.retry.backoff(item.attempt);
            warn!(
                job_id,
                attempt = item.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Job failed; scheduling retry"
            );
            let patch = JobPatch::status(JobStatus::Retrying)
                .with_attempts(item.attempt)
                .with_error(err.to_string())
                .with_error_detail(detail);
            if let Err(e) = self.store.update(job_id, patch).await {
                warn!(job_id, error = %e, "Failed to record retry");
            }
            if let Err(e) = self.queue.requeue(item, delay).await {
                error!(job_id, error = %e, "Failed to requeue job");
            }
        } else {
            error!(
                job_id,
                attempt = item.attempt,
                error = %err,
                "Job failed terminally"
            );
            let patch = JobPatch::status(JobStatus::Failed)
                .with_attempts(item.attempt)
                .with_error(err.to_string())
                .with_error_detail(detail);
            if let Err(e) = self.store.update(job_id, patch).await {
                warn!(job_id, error = %e, "Failed to record failure");
            }
            if let Err(e) = self.queue.settle(item, SettleOutcome::Failed).await {
                warn!(job_id, error = %e, "Failed to settle failed job");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cardmill_core::{JobRecord, JobSubmission};
    use cardmill_store::{InMemoryJobStore, InMemoryWorkQueue};

    use crate::pipeline::PipelineOutput;

    struct StubGenerator {
        fail_with: Option<fn() -> Error>,
    }

    #[async_trait]
    impl CardGenerator for StubGenerator {
        async fn generate(
            &self,
            _input: &GenerateInput,
            _timings: &mut StepTimings,
        ) -> Result<PipelineOutput> {
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

    fn submission(job_id: &str) -> JobSubmission {
        JobSubmission {
            job_id: job_id.into(),
            session_id: None,
            card_id: "c1".into(),
            persona: "friend".into(),
            theme: "birthday".into(),
            locale: Some("ar".into()),
            name: Some("Sam".into()),
            message: Some("Hi".into()),
        }
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            retry: RetryPolicy::default().with_base_delay(Duration::from_millis(1)),
            ..Default::default()
        }
    }

    async fn seeded(
        fail_with: Option<fn() -> Error>,
    ) -> (Arc<InMemoryJobStore>, Arc<InMemoryWorkQueue>, Dispatcher) {
        let store = Arc::new(InMemoryJobStore::default());
        let queue = Arc::new(InMemoryWorkQueue::new());
        store
            .create_or_get(JobRecord::queued(&submission("j1")))
            .await
            .unwrap();
        queue.enqueue("j1").await.unwrap();
        let dispatcher = Dispatcher::new(
            store.clone(),
            queue.clone(),
            Arc::new(StubGenerator { fail_with }),
            config(),
        );
        (store, queue, dispatcher)
    }

    #[tokio::test]
    async fn test_success_records_output_and_settles() {
        let (store, queue, dispatcher) = seeded(None).await;
        let item = queue.claim_next().await.unwrap().unwrap();
        dispatcher.process(item).await;

        let record = store.get("j1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.output_url, "https://x/out.jpg");
        assert_eq!(record.merge_job_id, "m-1");
        assert_eq!(record.attempts_made, "1");
        // settled, not redelivered
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_below_limit_retries() {
        let (store, queue, dispatcher) = seeded(Some(|| Error::Upstream("503".into()))).await;
        let item = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(item.attempt, 1);
        dispatcher.process(item).await;

        let record = store.get("j1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Retrying);
        assert!(record.error.contains("503"));
        assert!(!record.error_detail.is_empty());

        // redelivered after the backoff with an incremented attempt
        sleep(Duration::from_millis(20)).await;
        let redelivered = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(redelivered.attempt, 2);
    }

    #[tokio::test]
    async fn test_failure_on_final_attempt_is_terminal() {
        let (store, queue, dispatcher) = seeded(Some(|| Error::Upstream("503".into()))).await;
        for expected_attempt in 1..=3u32 {
            let item = queue.claim_next().await.unwrap().unwrap();
            assert_eq!(item.attempt, expected_attempt);
            dispatcher.process(item).await;
            sleep(Duration::from_millis(20)).await;
        }

        let record = store.get("j1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.attempts_made, "3");
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_option_failure_is_terminal_on_first_attempt() {
        let (store, queue, dispatcher) =
            seeded(Some(|| Error::UnknownOption("persona: pirate".into()))).await;
        let item = queue.claim_next().await.unwrap().unwrap();
        dispatcher.process(item).await;

        let record = store.get("j1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.contains("pirate"));
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_record_settles_without_resurrection() {
        let store = Arc::new(InMemoryJobStore::default());
        let queue = Arc::new(InMemoryWorkQueue::new());
        // work exists but the record never did
        queue.enqueue("ghost").await.unwrap();
        let dispatcher = Dispatcher::new(
            store.clone(),
            queue.clone(),
            Arc::new(StubGenerator { fail_with: None }),
            config(),
        );

        let item = queue.claim_next().await.unwrap().unwrap();
        dispatcher.process(item).await;

        assert!(store.get("ghost").await.unwrap().is_none());
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_detail_truncated() {
        let (store, queue, dispatcher) =
            seeded(Some(|| Error::Upstream("x".repeat(10_000)))).await;
        let item = queue.claim_next().await.unwrap().unwrap();
        dispatcher.process(item).await;

        let record = store.get("j1").await.unwrap().unwrap();
        assert_eq!(
            record.error_detail.chars().count(),
            defaults::ERROR_DETAIL_MAX_CHARS
        );
    }

    #[tokio::test]
    async fn test_start_drains_queue_and_shuts_down() {
        let store = Arc::new(InMemoryJobStore::default());
        let queue = Arc::new(InMemoryWorkQueue::new());
        for i in 0..3 {
            let id = format!("j{i}");
            store
                .create_or_get(JobRecord::queued(&submission(&id)))
                .await
                .unwrap();
            queue.enqueue(&id).await.unwrap();
        }

        let dispatcher = Dispatcher::new(
            store.clone(),
            queue.clone(),
            Arc::new(StubGenerator { fail_with: None }),
            DispatcherConfig {
                idle_poll_interval: Duration::from_millis(5),
                ..config()
            },
        );
        let handle = dispatcher.start();

        sleep(Duration::from_millis(100)).await;
        for i in 0..3 {
            let record = store.get(&format!("j{i}")).await.unwrap().unwrap();
            assert_eq!(record.status, JobStatus::Succeeded);
        }
        handle.shutdown().await.unwrap();
    }
}
