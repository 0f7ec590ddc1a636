//! Redis-backed durable work queue.
//!
//! Layout under the queue namespace `{ns}`:
//!
//! - `{ns}:ids` — set of tracked identities (dedupe guard)
//! - `{ns}:pending` — list of ready job ids
//! - `{ns}:active` — list of claimed job ids (crash-recovery visibility)
//! - `{ns}:delayed` — zset of job ids scored by redelivery time (unix ms)
//! - `{ns}:attempts` — hash of delivery attempt counters
//! - `{ns}:completed` / `{ns}:failed` — bounded settle history; evicting
//!   the oldest entry frees its identity for reuse
//!
//! Delivery is at-least-once: a claim moves the id from pending to active,
//! and only settle or requeue removes it from active.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use cardmill_core::{defaults, Error, Result, SettleOutcome, WorkItem, WorkQueue};

fn store_err(e: redis::RedisError) -> Error {
    Error::Store(e.to_string())
}

/// Reserve the identity and push the pending item as one atomic unit.
/// Split commands could strand a reserved identity with no claimable work
/// if the process dies between them.
///
/// KEYS[1] = ids set, KEYS[2] = pending list, ARGV[1] = job id.
/// Returns 1 when enqueued, 0 when the identity was already tracked.
const ENQUEUE_SCRIPT: &str = r#"
if redis.call('SADD', KEYS[1], ARGV[1]) == 0 then
  return 0
end
redis.call('LPUSH', KEYS[2], ARGV[1])
return 1
"#;

/// Durable work queue backed by Redis lists and sorted sets.
#[derive(Clone)]
pub struct RedisWorkQueue {
    connection: ConnectionManager,
    namespace: String,
    completed_retain: usize,
    failed_retain: usize,
}

impl RedisWorkQueue {
    /// Connect to Redis at `url` under the given queue namespace.
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let connection = ConnectionManager::new(client).await.map_err(store_err)?;
        Ok(Self {
            connection,
            namespace: namespace.into(),
            completed_retain: defaults::QUEUE_COMPLETED_RETAIN,
            failed_retain: defaults::QUEUE_FAILED_RETAIN,
        })
    }

    fn key(&self, part: &str) -> String {
        format!("{}:{}", self.namespace, part)
    }

    /// Move due delayed items onto the pending list.
    async fn promote_due(&self, conn: &mut ConnectionManager) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore(self.key("delayed"), 0, now)
            .await
            .map_err(store_err)?;
        for job_id in due {
            // ZREM returning 0 means another worker already promoted it.
            let removed: i64 = conn
                .zrem(self.key("delayed"), &job_id)
                .await
                .map_err(store_err)?;
            if removed > 0 {
                let () = conn
                    .lpush(self.key("pending"), &job_id)
                    .await
                    .map_err(store_err)?;
                debug!(job_id, "Promoted delayed work item");
            }
        }
        Ok(())
    }

    /// Append to a bounded history list, evicting the oldest identity when
    /// the bound is exceeded.
    async fn record_history(
        &self,
        conn: &mut ConnectionManager,
        list: &str,
        retain: usize,
        job_id: &str,
    ) -> Result<()> {
        let key = self.key(list);
        let () = conn.lpush(&key, job_id).await.map_err(store_err)?;
        let len: usize = conn.llen(&key).await.map_err(store_err)?;
        if len > retain {
            let evicted: Option<String> = conn.rpop(&key, None).await.map_err(store_err)?;
            if let Some(old_id) = evicted {
                let () = conn
                    .srem(self.key("ids"), &old_id)
                    .await
                    .map_err(store_err)?;
                let () = conn
                    .hdel(self.key("attempts"), &old_id)
                    .await
                    .map_err(store_err)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn enqueue(&self, job_id: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let added: i64 = redis::Script::new(ENQUEUE_SCRIPT)
            .key(self.key("ids"))
            .key(self.key("pending"))
            .arg(job_id)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        if added == 0 {
            return Err(Error::AlreadyQueued(job_id.to_string()));
        }
        debug!(job_id, "Enqueued work item");
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<WorkItem>> {
        let mut conn = self.connection.clone();
        self.promote_due(&mut conn).await?;

        let claimed: Option<String> = conn
            .rpoplpush(self.key("pending"), self.key("active"))
            .await
            .map_err(store_err)?;
        let Some(job_id) = claimed else {
            return Ok(None);
        };
        let attempt: i64 = conn
            .hincr(self.key("attempts"), &job_id, 1)
            .await
            .map_err(store_err)?;
        Ok(Some(WorkItem {
            job_id,
            attempt: attempt.max(1) as u32,
        }))
    }

    async fn requeue(&self, item: &WorkItem, delay: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let () = conn
            .lrem(self.key("active"), 1, &item.job_id)
            .await
            .map_err(store_err)?;
        let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let () = conn
            .zadd(self.key("delayed"), &item.job_id, due)
            .await
            .map_err(store_err)?;
        debug!(job_id = %item.job_id, attempt = item.attempt, delay_ms = delay.as_millis() as u64, "Requeued work item");
        Ok(())
    }

    async fn settle(&self, item: &WorkItem, outcome: SettleOutcome) -> Result<()> {
        let mut conn = self.connection.clone();
        let () = conn
            .lrem(self.key("active"), 1, &item.job_id)
            .await
            .map_err(store_err)?;
        match outcome {
            SettleOutcome::Completed => {
                self.record_history(&mut conn, "completed", self.completed_retain, &item.job_id)
                    .await
            }
            SettleOutcome::Failed => {
                self.record_history(&mut conn, "failed", self.failed_retain, &item.job_id)
                    .await
            }
        }
    }
}
