//! The `SceneSchema` root: the sole contract among capture agent,
//! broker, and importer.

use crate::node::AnalyzedNode;
use crate::registry::{
    AssetRegistry, ComponentRegistry, DesignTokenRegistry, StyleRegistry, VariantRegistry,
};
use serde::{Deserialize, Serialize};

/// Schema version emitted by this producer. Consumers accept any
/// version with the same major component.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// True when a consumer at `SCHEMA_VERSION` can read `candidate`.
/// The schema is append-only within a major version, so only the major
/// component gates compatibility.
#[must_use]
pub fn version_compatible(candidate: &str) -> bool {
    let ours = SCHEMA_VERSION.split('.').next().unwrap_or("0");
    candidate.split('.').next() == Some(ours)
}

/// Coordinate system of every numeric coordinate in one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinateSystem {
    #[default]
    #[serde(rename = "css-pixels")]
    CssPixels,
    #[serde(rename = "device-pixels")]
    DevicePixels,
}

/// Viewport metrics at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportInfo {
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
    pub layout_viewport_width: f64,
    pub layout_viewport_height: f64,
    /// Full scrollable document height, not just the visible part.
    pub scroll_height: f64,
}

/// Capture provenance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub url: String,
    pub title: String,
    /// RFC 3339 capture timestamp.
    pub captured_at: String,
    pub viewport: ViewportInfo,
    pub capture_coordinate_system: CoordinateSystem,
    /// Scale factor applied when `capture_coordinate_system` is
    /// device pixels; 1.0 otherwise.
    pub screenshot_scale: f64,
    /// Set when the capture hit its outer timeout and emitted early.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
}

/// Root scene document. Immutable once assembled; the enhancer
/// produces a new schema rather than mutating one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSchema {
    pub version: String,
    pub metadata: Metadata,
    pub root: AnalyzedNode,
    #[serde(default)]
    pub assets: AssetRegistry,
    #[serde(default)]
    pub styles: StyleRegistry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentRegistry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<VariantRegistry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<DesignTokenRegistry>,
}

impl SceneSchema {
    /// A schema with the current version and the given root and
    /// metadata, with empty registries.
    #[must_use]
    pub fn new(metadata: Metadata, root: AnalyzedNode) -> Self {
        Self {
            version: SCHEMA_VERSION.to_owned(),
            metadata,
            root,
            assets: AssetRegistry::default(),
            styles: StyleRegistry::default(),
            components: None,
            variants: None,
            tokens: None,
        }
    }

    /// Total node count including the root.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.root.subtree_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    #[test]
    fn version_gate_is_major_only() {
        assert!(version_compatible("1.0.0"));
        assert!(version_compatible("1.4.2"));
        assert!(!version_compatible("2.0.0"));
        assert!(!version_compatible("0.9.0"));
    }

    #[test]
    fn schema_round_trips_through_json() {
        let root = AnalyzedNode::new("root", NodeType::Frame, "html");
        let schema = SceneSchema::new(Metadata::default(), root);
        let json = serde_json::to_string(&schema).unwrap();
        let back: SceneSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, back);
    }

    #[test]
    fn coordinate_system_uses_hyphenated_names() {
        let json = serde_json::to_value(CoordinateSystem::DevicePixels).unwrap();
        assert_eq!(json, "device-pixels");
    }
}
