//! Card catalog: the process-wide configuration of cards, persona/theme
//! option sets, and locale-tagged templates.
//!
//! Loaded once at startup, wrapped in an `Arc`, and shared read-only across
//! concurrent requests. Lookups are linear scans over small lists and return
//! `Option` rather than erroring across component boundaries.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The full card catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub cards: Vec<Card>,
}

/// A configured template family with persona/theme option sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub card_id: String,
    pub personas: OptionGroup,
    pub themes: OptionGroup,
    #[serde(default)]
    pub templates: Vec<Template>,
}

/// A named set of options plus the data-row field tag its choice fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionGroup {
    /// Data-row column header this group's choice is written under.
    pub field_tag: String,
    pub options: Vec<AssetOption>,
}

/// A named bundle of candidate asset keys (ornaments for personas,
/// backgrounds for themes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetOption {
    pub name: String,
    #[serde(default)]
    pub assets: Vec<String>,
}

/// A locale-tagged merge template and its font asset keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub locale: String,
    #[serde(default)]
    pub asset_key: String,
    #[serde(default)]
    pub fonts: Vec<String>,
}

impl Catalog {
    /// Load and validate the catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&raw)?;
        if catalog.cards.is_empty() {
            return Err(Error::Config(format!(
                "catalog has no cards: {}",
                path.display()
            )));
        }
        Ok(catalog)
    }

    /// Find a card by id.
    pub fn find_card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.card_id == card_id)
    }
}

impl Card {
    /// Resolve a template by exact locale match, falling back to the first
    /// configured template when no locale matches.
    pub fn template_for_locale(&self, locale: &str) -> Option<&Template> {
        self.templates
            .iter()
            .find(|t| t.locale == locale)
            .or_else(|| self.templates.first())
    }
}

impl OptionGroup {
    /// Resolve an option by exact name match.
    pub fn find(&self, name: &str) -> Option<&AssetOption> {
        self.options.iter().find(|o| o.name == name)
    }
}
