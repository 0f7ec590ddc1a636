//! # cardmill-jobs
//!
//! Card-generation orchestration for cardmill.
//!
//! This crate provides:
//! - The submission gateway (validation and idempotent admission)
//! - The ten-step generation pipeline behind the [`CardGenerator`] seam
//! - The dispatcher: bounded-concurrency, rate-limited work processing
//!   with exponential-backoff retries
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cardmill_jobs::{Dispatcher, DispatcherConfig, GeneratePipeline, PipelineSettings};
//!
//! let pipeline = Arc::new(GeneratePipeline::new(
//!     catalog,
//!     asset_store,
//!     merge_service,
//!     PipelineSettings::default(),
//! ));
//!
//! let dispatcher = Dispatcher::new(store, queue, pipeline, DispatcherConfig::default());
//! let handle = dispatcher.start();
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod datarow;
pub mod dispatcher;
pub mod gateway;
pub mod merge_build;
pub mod pipeline;
pub mod retry;
pub mod selection;
pub mod timing;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle};
pub use gateway::{submit, validate, SubmitOutcome, SubmitRequest};
pub use pipeline::{
    CardGenerator, GeneratePipeline, PipelineOutput, PipelineSettings, SelectionSummary,
};
pub use retry::RetryPolicy;
pub use timing::{step, StepTimings};
