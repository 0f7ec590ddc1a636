//! # cardmill-clients
//!
//! HTTP implementations of cardmill's external collaborator traits: the
//! asset storage provider and the document merge service (including its
//! identity provider).

pub mod asset_store;
pub mod merge;

pub use asset_store::{AssetStoreConfig, HttpAssetStore};
pub use merge::{HttpMergeService, MergeServiceConfig};
