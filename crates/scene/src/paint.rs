//! Paints, effects, and the visual enums of the target node model.

use crate::geometry::Point;
use serde::{Deserialize, Serialize};

/// Normalized RGBA color (all channels 0..1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

impl Rgba {
    pub const BLACK: Self = Self::opaque(0.0, 0.0, 0.0);
    /// Neutral gray used for placeholder fills when an asset could not
    /// be acquired or an image handle could not be created.
    pub const PLACEHOLDER: Self = Self::opaque(0.8, 0.8, 0.8);

    #[inline]
    #[must_use]
    pub const fn new(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    #[inline]
    #[must_use]
    pub const fn opaque(red: f64, green: f64, blue: f64) -> Self {
        Self::new(red, green, blue, 1.0)
    }

    /// Build from 8-bit channels plus a unit alpha.
    #[inline]
    #[must_use]
    pub fn from_rgba8(red: u8, green: u8, blue: u8, alpha: f64) -> Self {
        Self {
            red: f64::from(red) / 255.0,
            green: f64::from(green) / 255.0,
            blue: f64::from(blue) / 255.0,
            alpha,
        }
    }

    /// Channel-wise approximate equality, used by the style deduper's
    /// fingerprinting and by tests.
    #[inline]
    #[must_use]
    pub fn approx_eq(&self, other: &Self) -> bool {
        const TOLERANCE: f64 = 1.0 / 512.0;
        (self.red - other.red).abs() < TOLERANCE
            && (self.green - other.green).abs() < TOLERANCE
            && (self.blue - other.blue).abs() < TOLERANCE
            && (self.alpha - other.alpha).abs() < TOLERANCE
    }
}

/// One stop of a gradient paint. `position` is normalized 0..1 along the
/// gradient axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub color: Rgba,
    pub position: f64,
}

/// How an image paint maps onto its node box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFit {
    /// Stretch (or cover, when the paint preserves aspect) to the box.
    Fill,
    /// Preserve aspect, letterbox inside the box.
    Fit,
    /// Honor intrinsic size; the importer resizes the node back to
    /// intrinsic dimensions.
    Crop,
    /// Repeat at intrinsic size.
    Tile,
}

/// An ordered entry of a node's fill or stroke list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Paint {
    #[serde(rename = "SOLID")]
    Solid {
        color: Rgba,
        #[serde(default = "default_opacity")]
        opacity: f64,
        #[serde(default = "default_visible")]
        visible: bool,
    },
    #[serde(rename = "GRADIENT_LINEAR")]
    GradientLinear {
        /// Gradient direction in degrees, CSS convention (0 points up,
        /// angles increase clockwise).
        angle: f64,
        stops: Vec<GradientStop>,
        #[serde(default = "default_opacity")]
        opacity: f64,
        #[serde(default = "default_visible")]
        visible: bool,
    },
    #[serde(rename = "GRADIENT_RADIAL")]
    GradientRadial {
        /// Center normalized to the node box.
        center: Point,
        stops: Vec<GradientStop>,
        #[serde(default = "default_opacity")]
        opacity: f64,
        #[serde(default = "default_visible")]
        visible: bool,
    },
    #[serde(rename = "IMAGE")]
    Image {
        /// Content hash into `AssetRegistry::images`.
        image_hash: String,
        scale_mode: ImageFit,
        #[serde(default = "default_opacity")]
        opacity: f64,
        #[serde(default = "default_visible")]
        visible: bool,
    },
}

impl Paint {
    #[inline]
    #[must_use]
    pub const fn solid(color: Rgba) -> Self {
        Self::Solid {
            color,
            opacity: 1.0,
            visible: true,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        match self {
            Self::Solid { visible, .. }
            | Self::GradientLinear { visible, .. }
            | Self::GradientRadial { visible, .. }
            | Self::Image { visible, .. } => *visible,
        }
    }
}

const fn default_opacity() -> f64 {
    1.0
}

const fn default_visible() -> bool {
    true
}

/// An ordered visual effect. Shadow order preserves CSS declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Effect {
    #[serde(rename = "DROP_SHADOW")]
    DropShadow {
        color: Rgba,
        offset: Point,
        radius: f64,
        #[serde(default)]
        spread: f64,
        #[serde(default = "default_visible")]
        visible: bool,
    },
    #[serde(rename = "INNER_SHADOW")]
    InnerShadow {
        color: Rgba,
        offset: Point,
        radius: f64,
        #[serde(default)]
        spread: f64,
        #[serde(default = "default_visible")]
        visible: bool,
    },
    #[serde(rename = "LAYER_BLUR")]
    LayerBlur {
        radius: f64,
        #[serde(default = "default_visible")]
        visible: bool,
    },
    #[serde(rename = "BACKGROUND_BLUR")]
    BackgroundBlur {
        radius: f64,
        #[serde(default = "default_visible")]
        visible: bool,
    },
}

/// Stroke placement relative to the node boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrokeAlign {
    #[default]
    Inside,
    Outside,
    Center,
}

/// Per-side stroke weights for asymmetric borders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideWeights {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl SideWeights {
    /// True when all four sides share one weight.
    #[inline]
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        self.top == self.right && self.right == self.bottom && self.bottom == self.left
    }
}

/// Corner radius: a scalar when all four corners agree, per-corner
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CornerRadius {
    Uniform(f64),
    #[serde(rename_all = "camelCase")]
    PerCorner {
        top_left: f64,
        top_right: f64,
        bottom_right: f64,
        bottom_left: f64,
    },
}

impl CornerRadius {
    /// Collapse four corner values to a scalar only when equal.
    #[inline]
    #[must_use]
    pub fn from_corners(
        top_left: f64,
        top_right: f64,
        bottom_right: f64,
        bottom_left: f64,
    ) -> Option<Self> {
        if top_left == 0.0 && top_right == 0.0 && bottom_right == 0.0 && bottom_left == 0.0 {
            return None;
        }
        if top_left == top_right && top_right == bottom_right && bottom_right == bottom_left {
            Some(Self::Uniform(top_left))
        } else {
            Some(Self::PerCorner {
                top_left,
                top_right,
                bottom_right,
                bottom_left,
            })
        }
    }
}

/// Blend modes of the target node model. CSS `mix-blend-mode` values
/// outside this set force rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    /// Map a CSS `mix-blend-mode` keyword to the target enum; `None`
    /// means the mode is unrepresentable and the element must be
    /// rasterized.
    #[must_use]
    pub fn from_css(keyword: &str) -> Option<Self> {
        match keyword.trim() {
            "" | "normal" => Some(Self::Normal),
            "multiply" => Some(Self::Multiply),
            "screen" => Some(Self::Screen),
            "overlay" => Some(Self::Overlay),
            "darken" => Some(Self::Darken),
            "lighten" => Some(Self::Lighten),
            "color-dodge" => Some(Self::ColorDodge),
            "color-burn" => Some(Self::ColorBurn),
            "hard-light" => Some(Self::HardLight),
            "soft-light" => Some(Self::SoftLight),
            "difference" => Some(Self::Difference),
            "exclusion" => Some(Self::Exclusion),
            "hue" => Some(Self::Hue),
            "saturation" => Some(Self::Saturation),
            "color" => Some(Self::Color),
            "luminosity" => Some(Self::Luminosity),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_radius_collapses_only_when_uniform() {
        assert_eq!(
            CornerRadius::from_corners(4.0, 4.0, 4.0, 4.0),
            Some(CornerRadius::Uniform(4.0))
        );
        assert_eq!(CornerRadius::from_corners(0.0, 0.0, 0.0, 0.0), None);
        assert!(matches!(
            CornerRadius::from_corners(4.0, 8.0, 4.0, 4.0),
            Some(CornerRadius::PerCorner { top_right, .. }) if top_right == 8.0
        ));
    }

    #[test]
    fn blend_mode_rejects_unsupported_keywords() {
        assert_eq!(BlendMode::from_css("multiply"), Some(BlendMode::Multiply));
        assert_eq!(BlendMode::from_css("plus-lighter"), None);
    }

    #[test]
    fn paint_serializes_with_type_tag() {
        let paint = Paint::solid(Rgba::opaque(1.0, 0.0, 0.0));
        let json = serde_json::to_value(&paint).unwrap();
        assert_eq!(json["type"], "SOLID");
        assert_eq!(json["color"]["red"], 1.0);
    }
}
