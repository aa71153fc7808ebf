//! `AnalyzedNode` — one entry per visible element — and its satellite
//! types. Downstream consumers match on `node_type` to decide which
//! optional blocks are meaningful; they never sniff properties.

use crate::geometry::{AbsoluteTransform, LayoutRect};
use crate::paint::{BlendMode, CornerRadius, Effect, ImageFit, Paint, SideWeights, StrokeAlign};
use serde::{Deserialize, Serialize};

/// Target kind of a node. Selects which optional field blocks apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    Frame,
    Text,
    Rectangle,
    Image,
    Vector,
    Pseudo,
}

/// CSS layout metadata carried for stacking and clipping decisions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutContext {
    /// Computed `position` keyword.
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
    /// Computed `overflow` keyword.
    pub overflow: String,
    /// Raw computed `transform` string, advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// True when the element establishes a stacking context.
    #[serde(default)]
    pub stacking_context: bool,
}

/// Typography of a TEXT node, resolved against the rendered element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    /// Family the browser actually used.
    pub font_family: String,
    /// Recorded fallback stack for the importer to try in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub font_fallbacks: Vec<String>,
    pub font_weight: u16,
    pub font_style: FontStyle,
    pub font_size: f64,
    /// Line height in CSS pixels, never unitless.
    pub line_height: f64,
    #[serde(default)]
    pub letter_spacing: f64,
    #[serde(default)]
    pub text_decoration: TextDecoration,
    #[serde(default)]
    pub text_align: TextAlign,
    #[serde(default)]
    pub text_case: TextCase,
    #[serde(default)]
    pub text_auto_resize: TextAutoResize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
    Oblique,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextDecoration {
    #[default]
    None,
    Underline,
    Strikethrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextCase {
    #[default]
    Original,
    Upper,
    Lower,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextAutoResize {
    #[default]
    None,
    Height,
    WidthAndHeight,
}

/// Intrinsic (natural) pixel size of an image asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntrinsicSize {
    pub width: f64,
    pub height: f64,
}

impl IntrinsicSize {
    #[inline]
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Width over height; `None` when height is zero.
    #[inline]
    #[must_use]
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.height > 0.0 {
            Some(self.width / self.height)
        } else {
            None
        }
    }
}

/// Auto-layout hints detected on a flex-like container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLayout {
    pub mode: AutoLayoutMode,
    #[serde(default)]
    pub primary_axis_align_items: AxisAlign,
    #[serde(default)]
    pub counter_axis_align_items: AxisAlign,
    #[serde(default)]
    pub item_spacing: f64,
    pub padding: Padding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AutoLayoutMode {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AxisAlign {
    #[default]
    Min,
    Center,
    Max,
    SpaceBetween,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Why an element was captured as pixels instead of mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RasterReason {
    Filter,
    BlendMode,
    UnsupportedVisual,
}

/// Rasterization fallback record. When `data_url` is present it fully
/// replaces the node's visual fields at import time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rasterize {
    pub reason: RasterReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

/// Enhancer-suggested auto layout; additive, advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedAutoLayout {
    pub mode: AutoLayoutMode,
}

/// One analyzed element, pseudo-element, or synthetic frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Derived display name (tag plus class or role hints).
    pub name: String,
    pub html_tag: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,

    pub absolute_layout: LayoutRect,
    #[serde(default)]
    pub layout_context: LayoutContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_transform: Option<AbsoluteTransform>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fills: Vec<Paint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strokes: Vec<Paint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_align: Option<StrokeAlign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_side_weights: Option<SideWeights>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<Effect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<CornerRadius>,

    #[serde(default)]
    pub clips_content: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default)]
    pub isolation: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_style: Option<TextStyle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsic_size: Option<IntrinsicSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_fit: Option<ImageFit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_layout: Option<AutoLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rasterize: Option<Rasterize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AnalyzedNode>,

    /// Advisory CSS carryover; never authoritative for rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix_blend_mode: Option<String>,

    // Enhancer-owned additive annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_component_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_auto_layout: Option<SuggestedAutoLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_font_size: Option<f64>,
}

const fn default_opacity() -> f64 {
    1.0
}

impl AnalyzedNode {
    /// A bare node with defaults for every optional block.
    #[must_use]
    pub fn new(id: impl Into<String>, node_type: NodeType, html_tag: impl Into<String>) -> Self {
        let tag = html_tag.into();
        Self {
            id: id.into(),
            parent_id: None,
            name: tag.clone(),
            html_tag: tag,
            node_type,
            absolute_layout: LayoutRect::default(),
            layout_context: LayoutContext::default(),
            absolute_transform: None,
            fills: Vec::new(),
            strokes: Vec::new(),
            stroke_weight: None,
            stroke_align: None,
            stroke_side_weights: None,
            effects: Vec::new(),
            corner_radius: None,
            clips_content: false,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            isolation: false,
            characters: None,
            text_style: None,
            image_hash: None,
            intrinsic_size: None,
            aspect_ratio: None,
            image_fit: None,
            auto_layout: None,
            rasterize: None,
            children: Vec::new(),
            css_filter: None,
            mix_blend_mode: None,
            ocr_text: None,
            ml_classification: None,
            suggested_component_type: None,
            suggested_auto_layout: None,
            original_font_size: None,
        }
    }

    /// Depth-first pre-order visit of this node and every descendant.
    pub fn visit<'tree>(&'tree self, visitor: &mut impl FnMut(&'tree Self)) {
        visitor(self);
        for child in &self.children {
            child.visit(visitor);
        }
    }

    /// Total number of nodes in this subtree including self.
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |_| count += 1);
        count
    }

    /// Effective z-index used when re-sorting siblings across stacking
    /// contexts: explicit `z-index` when present, else 0.
    #[inline]
    #[must_use]
    pub fn effective_z_index(&self) -> i32 {
        self.layout_context.z_index.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_json_uses_camel_case_and_type_tag() {
        let mut node = AnalyzedNode::new("n1", NodeType::Frame, "div");
        node.absolute_layout = LayoutRect::new(0.0, 0.0, 100.0, 50.0);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "FRAME");
        assert_eq!(json["htmlTag"], "div");
        assert_eq!(json["absoluteLayout"]["width"], 100.0);
        // Empty optional blocks stay off the wire.
        assert!(json.get("fills").is_none());
        assert!(json.get("imageHash").is_none());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let json = r#"{
            "id": "n1", "name": "div", "htmlTag": "div", "type": "FRAME",
            "absoluteLayout": {"left": 0, "top": 0, "width": 10, "height": 10},
            "futureField": {"anything": true}
        }"#;
        let node: AnalyzedNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.id, "n1");
    }

    #[test]
    fn subtree_len_counts_descendants() {
        let mut root = AnalyzedNode::new("r", NodeType::Frame, "body");
        let mut child = AnalyzedNode::new("c", NodeType::Rectangle, "div");
        child
            .children
            .push(AnalyzedNode::new("g", NodeType::Text, "span"));
        root.children.push(child);
        assert_eq!(root.subtree_len(), 3);
    }
}
