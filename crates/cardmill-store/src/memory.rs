//! In-memory implementations of the store and queue traits.
//!
//! Used by tests and local development. Semantics match the Redis
//! implementations: idempotent create, no TTL refresh on update, identity
//! dedupe, delayed redelivery, and bounded settle history.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use cardmill_core::{
    defaults, Error, JobPatch, JobRecord, JobStore, Result, SettleOutcome, WorkItem, WorkQueue,
};

/// In-memory job record store with lazy expiry.
pub struct InMemoryJobStore {
    records: Mutex<HashMap<String, (JobRecord, Instant)>>,
    ttl: Duration,
}

impl InMemoryJobStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(defaults::JOB_TTL_SECONDS))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_or_get(&self, record: JobRecord) -> Result<JobRecord> {
        let mut records = self.records.lock().await;
        let now = Instant::now();
        match records.get(&record.job_id) {
            Some((existing, expires)) if *expires > now => Ok(existing.clone()),
            _ => {
                let expires = now + self.ttl;
                records.insert(record.job_id.clone(), (record.clone(), expires));
                Ok(record)
            }
        }
    }

    async fn update(&self, job_id: &str, patch: JobPatch) -> Result<()> {
        let mut records = self.records.lock().await;
        let now = Instant::now();
        let Some((record, expires)) = records.get_mut(job_id) else {
            return Ok(());
        };
        if *expires <= now {
            records.remove(job_id);
            return Ok(());
        }
        for (field, value) in patch.to_fields() {
            match field.as_str() {
                "status" => record.status = value.parse()?,
                "attemptsMade" => record.attempts_made = value,
                "error" => record.error = value,
                "errorDetail" => record.error_detail = value,
                "outputUrl" => record.output_url = value,
                "mergeJobId" => record.merge_job_id = value,
                other => {
                    return Err(Error::Internal(format!("unknown patch field: {other}")));
                }
            }
        }
        record.updated_at = Utc::now().timestamp_millis().to_string();
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let mut records = self.records.lock().await;
        let now = Instant::now();
        match records.get(job_id) {
            Some((record, expires)) if *expires > now => Ok(Some(record.clone())),
            Some(_) => {
                records.remove(job_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[derive(Default)]
struct QueueState {
    ids: HashSet<String>,
    pending: VecDeque<String>,
    active: HashSet<String>,
    delayed: Vec<(Instant, String)>,
    attempts: HashMap<String, u32>,
    completed: VecDeque<String>,
    failed: VecDeque<String>,
}

/// In-memory work queue with identity dedupe and delayed redelivery.
pub struct InMemoryWorkQueue {
    state: Mutex<QueueState>,
    completed_retain: usize,
    failed_retain: usize,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            completed_retain: defaults::QUEUE_COMPLETED_RETAIN,
            failed_retain: defaults::QUEUE_FAILED_RETAIN,
        }
    }

    /// Number of items ready for immediate claim.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Number of items scheduled for delayed redelivery.
    pub async fn delayed_len(&self) -> usize {
        self.state.lock().await.delayed.len()
    }
}

impl Default for InMemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn evict_history(
    history: &mut VecDeque<String>,
    retain: usize,
    ids: &mut HashSet<String>,
    attempts: &mut HashMap<String, u32>,
) {
    while history.len() > retain {
        if let Some(old_id) = history.pop_back() {
            ids.remove(&old_id);
            attempts.remove(&old_id);
        }
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.ids.insert(job_id.to_string()) {
            return Err(Error::AlreadyQueued(job_id.to_string()));
        }
        state.pending.push_front(job_id.to_string());
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<WorkItem>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let (due, later): (Vec<_>, Vec<_>) = state
            .delayed
            .drain(..)
            .partition(|(at, _)| *at <= now);
        state.delayed = later;
        for (_, job_id) in due {
            state.pending.push_front(job_id);
        }

        let Some(job_id) = state.pending.pop_back() else {
            return Ok(None);
        };
        state.active.insert(job_id.clone());
        let attempt = state
            .attempts
            .entry(job_id.clone())
            .and_modify(|a| *a += 1)
            .or_insert(1);
        Ok(Some(WorkItem {
            attempt: *attempt,
            job_id,
        }))
    }

    async fn requeue(&self, item: &WorkItem, delay: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        state.active.remove(&item.job_id);
        state
            .delayed
            .push((Instant::now() + delay, item.job_id.clone()));
        Ok(())
    }

    async fn settle(&self, item: &WorkItem, outcome: SettleOutcome) -> Result<()> {
        let mut state = self.state.lock().await;
        state.active.remove(&item.job_id);
        let state = &mut *state;
        match outcome {
            SettleOutcome::Completed => {
                state.completed.push_front(item.job_id.clone());
                evict_history(
                    &mut state.completed,
                    self.completed_retain,
                    &mut state.ids,
                    &mut state.attempts,
                );
            }
            SettleOutcome::Failed => {
                state.failed.push_front(item.job_id.clone());
                evict_history(
                    &mut state.failed,
                    self.failed_retain,
                    &mut state.ids,
                    &mut state.attempts,
                );
            }
        }
        Ok(())
    }
}
