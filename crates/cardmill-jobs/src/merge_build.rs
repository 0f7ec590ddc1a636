//! Merge request assembly: map every referenced asset to its presigned URL
//! and attach the fixed merge parameters.

use serde::Serialize;

use cardmill_core::{
    AssetSource, Error, ExportSettings, FontSettings, GeneralSettings, ImagePlacementOptions,
    MergeAsset, MergeParams, MergeRequest, Result,
};

use crate::selection::Selection;

/// Role an asset plays in the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Background,
    Ornament,
    Template,
    DataFile,
    Font,
}

/// A referenced asset awaiting a retrieval URL.
#[derive(Debug, Clone)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub asset_key: String,
}

/// An asset with its short-lived retrieval URL resolved.
#[derive(Debug, Clone)]
pub struct PresignedAsset {
    pub kind: AssetKind,
    pub asset_key: String,
    pub url: String,
}

/// Every asset the merge references: background, ornament, template, the
/// uploaded data file, and each template font (the list may be empty).
pub fn presign_targets(selection: &Selection, data_file_key: &str) -> Vec<AssetRef> {
    let mut targets = vec![
        AssetRef {
            kind: AssetKind::Background,
            asset_key: selection.background.clone(),
        },
        AssetRef {
            kind: AssetKind::Ornament,
            asset_key: selection.ornament.clone(),
        },
        AssetRef {
            kind: AssetKind::Template,
            asset_key: selection.template.asset_key.clone(),
        },
        AssetRef {
            kind: AssetKind::DataFile,
            asset_key: data_file_key.to_string(),
        },
    ];
    targets.extend(selection.template.fonts.iter().map(|f| AssetRef {
        kind: AssetKind::Font,
        asset_key: f.clone(),
    }));
    targets
}

/// A font lands in the configured font directory under its base filename.
fn font_destination(font_key: &str, font_dir: &str) -> String {
    let base = font_key.rsplit('/').next().unwrap_or(font_key);
    format!("{font_dir}/{base}")
}

fn find_url<'a>(
    presigned: &'a [PresignedAsset],
    kind: AssetKind,
    asset_key: &str,
) -> Option<&'a str> {
    presigned
        .iter()
        .find(|p| p.kind == kind && p.asset_key == asset_key)
        .map(|p| p.url.as_str())
}

/// Assemble the merge request from presigned assets.
///
/// A missing background/ornament/template/data-file URL is a consistency
/// failure; presigning either resolved everything or failed outright.
pub fn build_merge_request(
    selection: &Selection,
    data_file_key: &str,
    presigned: &[PresignedAsset],
    font_dir: &str,
) -> Result<MergeRequest> {
    let background_url = find_url(presigned, AssetKind::Background, &selection.background);
    let ornament_url = find_url(presigned, AssetKind::Ornament, &selection.ornament);
    let template_url = find_url(presigned, AssetKind::Template, &selection.template.asset_key);
    let data_file_url = find_url(presigned, AssetKind::DataFile, data_file_key);

    let (Some(background_url), Some(ornament_url), Some(template_url), Some(data_file_url)) =
        (background_url, ornament_url, template_url, data_file_url)
    else {
        return Err(Error::Upstream(
            "Failed to presign background/ornament/template/data file".to_string(),
        ));
    };

    let mut assets = vec![
        MergeAsset {
            destination: selection.ornament.clone(),
            source: AssetSource {
                url: ornament_url.to_string(),
            },
        },
        MergeAsset {
            destination: selection.background.clone(),
            source: AssetSource {
                url: background_url.to_string(),
            },
        },
        MergeAsset {
            destination: selection.template.asset_key.clone(),
            source: AssetSource {
                url: template_url.to_string(),
            },
        },
        MergeAsset {
            destination: data_file_key.to_string(),
            source: AssetSource {
                url: data_file_url.to_string(),
            },
        },
    ];

    for font_key in &selection.template.fonts {
        let url = find_url(presigned, AssetKind::Font, font_key).ok_or_else(|| {
            Error::Upstream(format!("Failed to presign font {font_key}"))
        })?;
        assets.push(MergeAsset {
            destination: font_destination(font_key, font_dir),
            source: AssetSource {
                url: url.to_string(),
            },
        });
    }

    let params = MergeParams {
        data_source: data_file_key.to_string(),
        image_placement_options: ImagePlacementOptions {
            fitting_option: "honor_existing_style".to_string(),
        },
        export_settings: ExportSettings {
            quality: "maximum".to_string(),
            resolution: 72,
        },
        output_media_type: "image/jpeg".to_string(),
        target_document: selection.template.asset_key.clone(),
        general_settings: GeneralSettings {
            fonts: FontSettings {
                fonts_directories: vec![font_dir.to_string()],
            },
        },
    };

    Ok(MergeRequest { assets, params })
}
