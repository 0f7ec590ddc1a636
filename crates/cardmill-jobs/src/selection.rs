//! Asset selection: resolve persona, theme, and template options for a
//! request and pick concrete assets.
//!
//! Ornament and background picks are uniform random per request and are not
//! reproducible. Lookups are exact-name matches over the configured option
//! lists.

use rand::seq::SliceRandom;
use serde::Serialize;

use cardmill_core::{Catalog, Error, GenerateInput, Result, Template};

/// The concrete assets chosen for one generation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Chosen ornament asset key (from the persona's list).
    pub ornament: String,
    /// Chosen background asset key (from the theme's list).
    pub background: String,
    /// Resolved template, with its font list.
    pub template: Template,
    /// Data-row field tag configured for the persona group.
    pub persona_tag: String,
    /// Data-row field tag configured for the theme group.
    pub theme_tag: String,
}

/// Resolve the card's options for this request and pick assets.
pub fn select_assets(catalog: &Catalog, input: &GenerateInput) -> Result<Selection> {
    let card = catalog
        .find_card(&input.card_id)
        .ok_or_else(|| Error::NotFound(format!("Unknown cardId: {}", input.card_id)))?;

    let persona = card
        .personas
        .find(&input.persona)
        .ok_or_else(|| Error::UnknownOption(format!("Unknown persona: {}", input.persona)))?;
    let ornament = persona
        .assets
        .choose(&mut rand::thread_rng())
        .ok_or_else(|| {
            Error::UnknownOption(format!("No ornaments for persona: {}", input.persona))
        })?
        .clone();

    let theme = card
        .themes
        .find(&input.theme)
        .ok_or_else(|| Error::UnknownOption(format!("Unknown theme: {}", input.theme)))?;
    let background = theme
        .assets
        .choose(&mut rand::thread_rng())
        .ok_or_else(|| Error::UnknownOption(format!("No backgrounds for theme: {}", input.theme)))?
        .clone();

    let template = card
        .template_for_locale(&input.locale)
        .filter(|t| !t.asset_key.is_empty())
        .ok_or_else(|| {
            Error::UnknownOption(format!("No template found for locale: {}", input.locale))
        })?
        .clone();

    Ok(Selection {
        ornament,
        background,
        template,
        persona_tag: card.personas.field_tag.clone(),
        theme_tag: card.themes.field_tag.clone(),
    })
}
