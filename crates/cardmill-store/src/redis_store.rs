//! Redis-backed job record store.
//!
//! Each job is a string-field hash under `{prefix}{job_id}` with a TTL set
//! at creation. Updates merge fields and refresh `updatedAt` but never the
//! TTL, so a long-running job can expire mid-processing — callers must poll
//! within the expiry horizon.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use cardmill_core::{Error, JobPatch, JobRecord, JobStore, Result};

/// Map substrate failures into the store error kind.
fn store_err(e: redis::RedisError) -> Error {
    Error::Store(e.to_string())
}

/// Create the full record hash and its TTL as one atomic unit, with the
/// existence check as the create/get discriminator. Split commands could
/// leave a skeleton hash with no expiry, or let a racing reader observe
/// it before the fields land.
///
/// KEYS[1] = record key, ARGV[1] = TTL seconds, ARGV[2..] = field/value
/// pairs. Returns 1 when created, 0 when the record already existed.
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
redis.call('EXPIRE', KEYS[1], ARGV[1])
return 1
"#;

/// Job record store backed by Redis hashes.
#[derive(Clone)]
pub struct RedisJobStore {
    connection: ConnectionManager,
    prefix: String,
    ttl: Duration,
}

impl RedisJobStore {
    /// Connect to Redis at `url` with the given key prefix and expiry
    /// horizon.
    pub async fn connect(url: &str, prefix: impl Into<String>, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let connection = ConnectionManager::new(client).await.map_err(store_err)?;
        Ok(Self {
            connection,
            prefix: prefix.into(),
            ttl,
        })
    }

    fn key(&self, job_id: &str) -> String {
        format!("{}{}", self.prefix, job_id)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create_or_get(&self, record: JobRecord) -> Result<JobRecord> {
        let key = self.key(&record.job_id);
        let mut conn = self.connection.clone();

        let script = redis::Script::new(CREATE_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation.key(&key).arg(self.ttl.as_secs());
        for (field, value) in record.to_fields() {
            invocation.arg(field).arg(value);
        }
        let created: i64 = invocation.invoke_async(&mut conn).await.map_err(store_err)?;

        if created == 0 {
            let fields: HashMap<String, String> = conn.hgetall(&key).await.map_err(store_err)?;
            return JobRecord::from_fields(fields);
        }
        debug!(job_id = %record.job_id, "Created job record");
        Ok(record)
    }

    async fn update(&self, job_id: &str, patch: JobPatch) -> Result<()> {
        let key = self.key(job_id);
        let mut conn = self.connection.clone();

        // Never resurrect an expired record: a blind HSET would recreate
        // the key with only the patched fields.
        let exists: bool = conn.exists(&key).await.map_err(store_err)?;
        if !exists {
            debug!(job_id, "Skipping update for absent job record");
            return Ok(());
        }

        let mut fields = patch.to_fields();
        fields.push((
            "updatedAt".to_string(),
            Utc::now().timestamp_millis().to_string(),
        ));
        let () = conn
            .hset_multiple(&key, &fields)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let key = self.key(job_id);
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn.hgetall(&key).await.map_err(store_err)?;
        if fields.is_empty() {
            return Ok(None);
        }
        JobRecord::from_fields(fields).map(Some)
    }
}
