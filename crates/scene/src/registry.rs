//! Shared registries referenced by id from nodes. Back-references are
//! always by key, never by pointer, so the schema stays a tree.

use crate::node::{IntrinsicSize, TextStyle};
use crate::paint::{Effect, Paint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One acquired image asset, keyed by content hash in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    /// Raw bytes, base64 on the wire. Mutually redundant with
    /// `data_url`; producers set at least one of the two.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
    pub intrinsic_size: IntrinsicSize,
    pub mime_type: String,
    #[serde(default)]
    pub has_alpha: bool,
}

/// A font family observed on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontAsset {
    pub family: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<String>,
    /// Optional embedded font source as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// All binary assets of a capture. BTreeMaps keep serialization
/// deterministic for snapshot comparisons.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRegistry {
    #[serde(default)]
    pub images: BTreeMap<String, ImageAsset>,
    #[serde(default)]
    pub fonts: BTreeMap<String, FontAsset>,
}

impl AssetRegistry {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.fonts.is_empty()
    }
}

/// A reusable color style promoted by the deduper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorStyleEntry {
    pub name: String,
    pub paint: Paint,
    pub usage_count: u32,
}

/// A reusable text style promoted by the deduper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyleEntry {
    pub name: String,
    pub text_style: TextStyle,
    pub usage_count: u32,
}

/// A reusable effect list promoted by the deduper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectStyleEntry {
    pub name: String,
    pub effects: Vec<Effect>,
    pub usage_count: u32,
}

/// Deduped reusable styles. Nodes keep their values inline; the
/// importer binds to these by fingerprint during reconstruction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRegistry {
    #[serde(default)]
    pub colors: BTreeMap<String, ColorStyleEntry>,
    #[serde(default)]
    pub text_styles: BTreeMap<String, TextStyleEntry>,
    #[serde(default)]
    pub effects: BTreeMap<String, EffectStyleEntry>,
}

impl StyleRegistry {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty() && self.text_styles.is_empty() && self.effects.is_empty()
    }
}

/// A detected repeated structure: one master node, instances grouped by
/// structural signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    pub master_node_id: String,
    /// Structural fingerprint (tag + role + child shape).
    pub signature: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_node_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRegistry {
    #[serde(default)]
    pub definitions: BTreeMap<String, ComponentDefinition>,
}

/// A CSS custom property lifted into the token graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignToken {
    /// Original `--css-name`.
    pub name: String,
    pub token_type: TokenType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    pub collection: String,
    /// Token ids this value references through `var()`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenType {
    Color,
    Number,
    String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignTokenRegistry {
    #[serde(default)]
    pub variables: BTreeMap<String, DesignToken>,
    /// Pure alias tokens: id → target token id.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// Which forced pseudo-state produced a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PseudoState {
    Hover,
    Focus,
}

/// Style delta of an interactive element under a forced pseudo-state.
/// Only fields that differ from the base state are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDelta {
    pub state: PseudoState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fills: Option<Vec<Paint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strokes: Option<Vec<Paint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Vec<Effect>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_style: Option<TextStyle>,
}

/// Per-element interactive-state variants, keyed by node id.
pub type VariantRegistry = BTreeMap<String, Vec<VariantDelta>>;

/// Stable style fingerprints. Registry keys are these fingerprints;
/// the assembler writes them and the importer binds by recomputing
/// them, so both sides must agree byte-for-byte.
pub mod fingerprint {
    use crate::node::TextStyle;
    use crate::paint::{Effect, Paint};

    /// Fingerprint of a paint for the color-style registry.
    #[must_use]
    pub fn paint(paint: &Paint) -> String {
        match paint {
            Paint::Solid { color, opacity, .. } => format!(
                "solid:{:.4}:{:.4}:{:.4}:{:.4}:{opacity:.4}",
                color.red, color.green, color.blue, color.alpha
            ),
            Paint::GradientLinear { angle, stops, .. } => {
                format!("linear:{angle:.2}:{}", stops.len())
            }
            Paint::GradientRadial { center, stops, .. } => {
                format!("radial:{:.2}:{:.2}:{}", center.x, center.y, stops.len())
            }
            Paint::Image { image_hash, .. } => format!("image:{image_hash}"),
        }
    }

    /// Fingerprint of a text style.
    #[must_use]
    pub fn text(text_style: &TextStyle) -> String {
        format!(
            "text:{}:{}:{:?}:{:.2}:{:.2}:{:.2}",
            text_style.font_family,
            text_style.font_weight,
            text_style.font_style,
            text_style.font_size,
            text_style.line_height,
            text_style.letter_spacing
        )
    }

    /// Fingerprint of an ordered effect list.
    #[must_use]
    pub fn effects(effects: &[Effect]) -> String {
        let parts: Vec<String> = effects
            .iter()
            .map(|effect| match effect {
                Effect::DropShadow {
                    color,
                    offset,
                    radius,
                    spread,
                    ..
                } => format!(
                    "drop:{:.3}:{:.3}:{:.3}:{:.3}:{radius:.2}:{spread:.2}:{:.2}:{:.2}",
                    color.red, color.green, color.blue, color.alpha, offset.x, offset.y
                ),
                Effect::InnerShadow {
                    color,
                    offset,
                    radius,
                    spread,
                    ..
                } => format!(
                    "inner:{:.3}:{:.3}:{:.3}:{:.3}:{radius:.2}:{spread:.2}:{:.2}:{:.2}",
                    color.red, color.green, color.blue, color.alpha, offset.x, offset.y
                ),
                Effect::LayerBlur { radius, .. } => format!("blur:{radius:.2}"),
                Effect::BackgroundBlur { radius, .. } => format!("bgblur:{radius:.2}"),
            })
            .collect();
        parts.join("|")
    }
}
