//! # cardmill-core
//!
//! Core types, traits, and configuration for the cardmill card-generation
//! orchestrator.
//!
//! This crate provides the foundational data structures and trait seams that
//! the store, client, job, and API crates depend on.

pub mod catalog;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use catalog::{AssetOption, Card, Catalog, OptionGroup, Template};
pub use config::ServiceConfig;
pub use error::{Error, ErrorKind, Result};
pub use models::{
    AssetSource, ExportSettings, FontSettings, GeneralSettings, GenerateInput,
    ImagePlacementOptions, JobPatch, JobRecord, JobStatus, JobSubmission, MergeAsset, MergeParams,
    MergeRequest, MergeSubmission, SettleOutcome, WorkItem,
};
pub use traits::{AssetStore, JobStore, MergeService, WorkQueue};
