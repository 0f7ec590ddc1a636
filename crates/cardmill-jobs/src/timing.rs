//! Per-step wall-clock timing for the generation pipeline.
//!
//! Every step is recorded under a stable name whether it succeeds or fails;
//! steps beyond a failure are simply absent.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;

use cardmill_core::Result;

/// Stable step names, in pipeline order.
pub mod step {
    pub const SELECT_ASSETS: &str = "select_assets";
    pub const BUILD_DATA_ROW: &str = "build_data_row";
    pub const SERIALIZE_DATA_ROW: &str = "serialize_data_row";
    pub const UPLOAD_DATA_FILE: &str = "upload_data_file";
    pub const PRESIGN_ASSETS: &str = "presign_assets";
    pub const BUILD_MERGE_REQUEST: &str = "build_merge_request";
    pub const AUTHENTICATE: &str = "authenticate";
    pub const SUBMIT_MERGE: &str = "submit_merge";
    pub const POLL_MERGE_STATUS: &str = "poll_merge_status";
    pub const EXTRACT_OUTPUT: &str = "extract_output";
}

/// Ordered step name → elapsed milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct StepTimings {
    entries: Vec<(&'static str, f64)>,
}

impl StepTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step's elapsed time, rounded to two decimal places.
    pub fn record(&mut self, name: &'static str, elapsed: Duration) {
        let ms = (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0;
        self.entries.push((name, ms));
    }

    /// Elapsed milliseconds for a step, if it ran.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ms)| *ms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.entries.iter().copied()
    }
}

/// Run a pipeline step, recording its duration under `name` regardless of
/// outcome.
pub async fn timed<T, Fut>(timings: &mut StepTimings, name: &'static str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let out = fut.await;
    timings.record(name, start.elapsed());
    out
}
