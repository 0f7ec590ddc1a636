//! The single-record data row carried into the merge step, and its CSV
//! serialization.
//!
//! The two variable column headers come from the card's configured field
//! tags, each normalized to carry the leading `@` marker. Caller-supplied
//! name and message values pass through unvalidated and untruncated.

use chrono::Utc;
use serde::Serialize;

use cardmill_core::{Error, Result};

use crate::selection::Selection;

/// One-row tabular record in declared header order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataRow {
    pub headers: Vec<String>,
    pub values: Vec<String>,
}

/// Add the leading marker character unless already present.
fn ensure_tag_marker(tag: &str) -> String {
    if tag.is_empty() || tag.starts_with('@') {
        tag.to_string()
    } else {
        format!("@{tag}")
    }
}

/// Build the data row for a selection: background and ornament asset keys
/// under the card's field tags, plus fixed Message and Name columns.
pub fn build_data_row(selection: &Selection, name: &str, message: &str) -> DataRow {
    let theme_tag = ensure_tag_marker(&selection.theme_tag);
    let persona_tag = ensure_tag_marker(&selection.persona_tag);

    DataRow {
        headers: vec![
            theme_tag,
            persona_tag,
            "Message".to_string(),
            "Name".to_string(),
        ],
        values: vec![
            selection.background.clone(),
            selection.ornament.clone(),
            message.to_string(),
            name.to_string(),
        ],
    }
}

/// Serialize the row to a one-record CSV buffer in header order.
pub fn serialize_data_row(row: &DataRow) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&row.headers)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    writer
        .write_record(&row.values)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    writer
        .into_inner()
        .map_err(|e| Error::Serialization(e.to_string()))
}

/// Guess a content type from the destination key's extension, defaulting
/// to a generic binary type.
pub fn guess_content_type(asset_key: &str) -> String {
    mime_guess::from_path(asset_key)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Generate a timestamp-based data-file key, optionally under a configured
/// prefix with trailing separators trimmed.
pub fn data_file_key(prefix: Option<&str>) -> String {
    let file_name = format!("merge_{}.csv", Utc::now().timestamp_millis());
    match prefix {
        Some(p) if !p.is_empty() => format!("{}/{}", p.trim_end_matches('/'), file_name),
        _ => file_name,
    }
}
