//! Environment configuration for the cardmill service.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PORT` | `8080` | HTTP listen port |
//! | `CONFIG_PATH` | `./config.json` | Card catalog file |
//! | `STORAGE_API_BASE` | — | Asset storage API base URL |
//! | `STORAGE_API_KEY` | required | Asset storage API key |
//! | `DATA_FILE_PREFIX` | `` | Key prefix for uploaded data files |
//! | `DATA_FILE_USE_PREFIX` | `false` | Whether the prefix is applied |
//! | `MERGE_CLIENT_ID` | required | Merge service client id |
//! | `MERGE_CLIENT_SECRET` | required | Merge service client secret |
//! | `REDIS_URL` | required | Job store / queue connection URL |
//! | `QUEUE_NAME` | `cardmill` | Queue namespace |
//! | `JOB_PREFIX` | `job:` | Job record key prefix |
//! | `JOB_TTL_SECONDS` | `86400` | Record expiry horizon |
//! | `POLL_INTERVAL_MS` | `2000` | Merge status poll interval |
//! | `POLL_TIMEOUT_MS` | `120000` | Merge status poll deadline |
//! | `FONT_DEST_DIR` | `fonts` | Font destination directory |
//! | `WORKER_CONCURRENCY` | `5` | Concurrent work items, clamped [1,50] |
//! | `WORKER_LIMITER_MAX` | `150` | Ops per limiter window, clamped [1,10000] |
//! | `WORKER_LIMITER_DURATION_MS` | `60000` | Limiter window, clamped [1000,600000] |

use std::time::Duration;

use crate::defaults;
use crate::error::{Error, Result};

/// Parse an env var as an integer clamped to `[min, max]`, using `fallback`
/// when unset or unparseable.
pub fn clamped_env_u64(name: &str, min: u64, max: u64, fallback: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(fallback)
        .clamp(min, max)
}

fn env_or(name: &str, fallback: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| fallback.to_string())
}

/// Full service configuration, validated at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub config_path: String,

    pub storage_api_base: String,
    pub storage_api_key: String,
    pub data_file_prefix: Option<String>,

    pub merge_client_id: String,
    pub merge_client_secret: String,

    pub redis_url: String,
    pub queue_name: String,
    pub job_prefix: String,
    pub job_ttl: Duration,

    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub font_dest_dir: String,

    pub worker_concurrency: u32,
    pub limiter_max_ops: u32,
    pub limiter_window: Duration,
}

impl ServiceConfig {
    /// Read configuration from the environment.
    ///
    /// Fails with a single `Config` error naming every missing required
    /// variable.
    pub fn from_env() -> Result<Self> {
        let storage_api_key = env_or("STORAGE_API_KEY", "");
        let merge_client_id = env_or("MERGE_CLIENT_ID", "");
        let merge_client_secret = env_or("MERGE_CLIENT_SECRET", "");
        let redis_url = env_or("REDIS_URL", "");

        let mut missing = Vec::new();
        if storage_api_key.is_empty() {
            missing.push("STORAGE_API_KEY");
        }
        if merge_client_id.is_empty() {
            missing.push("MERGE_CLIENT_ID");
        }
        if merge_client_secret.is_empty() {
            missing.push("MERGE_CLIENT_SECRET");
        }
        if redis_url.is_empty() {
            missing.push("REDIS_URL");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required env var(s): {}",
                missing.join(", ")
            )));
        }

        let use_prefix = env_or("DATA_FILE_USE_PREFIX", "false").to_lowercase() == "true";
        let prefix = env_or("DATA_FILE_PREFIX", "");
        let data_file_prefix = if use_prefix && !prefix.is_empty() {
            Some(prefix)
        } else {
            None
        };

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::SERVER_PORT),
            config_path: env_or("CONFIG_PATH", "./config.json"),
            storage_api_base: env_or("STORAGE_API_BASE", "https://api.cc-s3.net"),
            storage_api_key,
            data_file_prefix,
            merge_client_id,
            merge_client_secret,
            redis_url,
            queue_name: env_or("QUEUE_NAME", defaults::QUEUE_NAME),
            job_prefix: env_or("JOB_PREFIX", defaults::JOB_KEY_PREFIX),
            job_ttl: Duration::from_secs(clamped_env_u64(
                "JOB_TTL_SECONDS",
                1,
                u64::MAX,
                defaults::JOB_TTL_SECONDS,
            )),
            poll_interval: Duration::from_millis(clamped_env_u64(
                "POLL_INTERVAL_MS",
                1,
                u64::MAX,
                defaults::POLL_INTERVAL_MS,
            )),
            poll_timeout: Duration::from_millis(clamped_env_u64(
                "POLL_TIMEOUT_MS",
                1,
                u64::MAX,
                defaults::POLL_TIMEOUT_MS,
            )),
            font_dest_dir: env_or("FONT_DEST_DIR", defaults::FONT_DEST_DIR),
            worker_concurrency: clamped_env_u64(
                "WORKER_CONCURRENCY",
                defaults::WORKER_CONCURRENCY_MIN as u64,
                defaults::WORKER_CONCURRENCY_MAX as u64,
                defaults::WORKER_CONCURRENCY as u64,
            ) as u32,
            limiter_max_ops: clamped_env_u64(
                "WORKER_LIMITER_MAX",
                defaults::LIMITER_MAX_OPS_MIN as u64,
                defaults::LIMITER_MAX_OPS_MAX as u64,
                defaults::LIMITER_MAX_OPS as u64,
            ) as u32,
            limiter_window: Duration::from_millis(clamped_env_u64(
                "WORKER_LIMITER_DURATION_MS",
                defaults::LIMITER_WINDOW_MS_MIN,
                defaults::LIMITER_WINDOW_MS_MAX,
                defaults::LIMITER_WINDOW_MS,
            )),
        })
    }
}
