//! The `DesignHost` trait: the importer's seam to a scriptable design
//! tool. Node creation and property setters are synchronous; font
//! loading and image uploads suspend.

use scene::node::{AutoLayout, TextStyle};
use scene::paint::GradientStop;
use scene::{CornerRadius, Effect, ImageFit, Point, Result, Rgba, StrokeAlign};
use std::future::Future;

/// Node kinds the target tool can create. IMAGE nodes materialize as
/// rectangles carrying an image paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Frame,
    Rectangle,
    Text,
    Vector,
}

/// Image-paint color adjustments, the representable image-only filter
/// trio. 1.0 is neutral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageAdjustments {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
}

impl Default for ImageAdjustments {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

impl ImageAdjustments {
    #[inline]
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        self.brightness == 1.0 && self.contrast == 1.0 && self.saturation == 1.0
    }
}

/// A paint as handed to the design tool, with image handles resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum HostPaint<ImageHandle> {
    Solid {
        color: Rgba,
        opacity: f64,
    },
    GradientLinear {
        angle: f64,
        stops: Vec<GradientStop>,
        opacity: f64,
    },
    GradientRadial {
        center: Point,
        stops: Vec<GradientStop>,
        opacity: f64,
    },
    Image {
        handle: ImageHandle,
        scale_mode: ImageFit,
        opacity: f64,
        adjustments: ImageAdjustments,
    },
}

/// Row-major 2x3 relative transform: `[[a, c, tx], [b, d, ty]]`.
pub type RelativeTransform = [[f64; 3]; 2];

/// Kinds of shared styles the deduper can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedStyleKind {
    Color,
    Text,
    Effect,
}

/// A scriptable design tool. The recording implementation lives in
/// [`crate::recording`]; production plugins adapt the real tool API.
pub trait DesignHost {
    /// Opaque node reference, cheap to clone.
    type NodeRef: Clone;
    /// Handle of an uploaded image.
    type ImageHandle: Clone;

    /// Create a page to hold the imported frames; returns its node.
    ///
    /// # Errors
    /// Host-specific creation failures.
    fn create_page(&mut self, name: &str) -> Result<Self::NodeRef>;

    /// Create a detached node of the given kind.
    ///
    /// # Errors
    /// Host-specific creation failures.
    fn create_node(&mut self, kind: TargetKind, name: &str) -> Result<Self::NodeRef>;

    /// Attach a node to a parent. Order of attachment is paint order.
    ///
    /// # Errors
    /// Host-specific attachment failures.
    fn append_child(&mut self, parent: &Self::NodeRef, child: &Self::NodeRef) -> Result<()>;

    /// # Errors
    /// Host-specific failures.
    fn resize(&mut self, node: &Self::NodeRef, width: f64, height: f64) -> Result<()>;

    /// Set the node's transform relative to its parent.
    ///
    /// # Errors
    /// Host-specific failures.
    fn set_relative_transform(
        &mut self,
        node: &Self::NodeRef,
        transform: RelativeTransform,
    ) -> Result<()>;

    /// Position the node relative to its parent. Not called under
    /// auto-layout parents, where insertion order decides placement.
    ///
    /// # Errors
    /// Host-specific failures.
    fn set_position(&mut self, node: &Self::NodeRef, x: f64, y: f64) -> Result<()>;

    /// # Errors
    /// Host-specific failures.
    fn set_fills(&mut self, node: &Self::NodeRef, fills: Vec<HostPaint<Self::ImageHandle>>)
    -> Result<()>;

    /// # Errors
    /// Host-specific failures.
    fn set_strokes(
        &mut self,
        node: &Self::NodeRef,
        strokes: Vec<HostPaint<Self::ImageHandle>>,
        weight: f64,
        align: StrokeAlign,
    ) -> Result<()>;

    /// # Errors
    /// Host-specific failures.
    fn set_effects(&mut self, node: &Self::NodeRef, effects: Vec<Effect>) -> Result<()>;

    /// # Errors
    /// Host-specific failures.
    fn set_corner_radius(&mut self, node: &Self::NodeRef, radius: CornerRadius) -> Result<()>;

    /// # Errors
    /// Host-specific failures.
    fn set_blend_mode(&mut self, node: &Self::NodeRef, blend_mode: scene::BlendMode) -> Result<()>;

    /// # Errors
    /// Host-specific failures.
    fn set_opacity(&mut self, node: &Self::NodeRef, opacity: f64) -> Result<()>;

    /// # Errors
    /// Host-specific failures.
    fn set_clips_content(&mut self, node: &Self::NodeRef, clips: bool) -> Result<()>;

    /// Upload image bytes; the returned handle is reusable across
    /// paints.
    fn create_image(
        &mut self,
        bytes: &[u8],
    ) -> impl Future<Output = Result<Self::ImageHandle>> + Send;

    /// Load a font for use by text nodes. Errors mean the family or
    /// style is unavailable; the caller walks its fallback stack.
    fn load_font(
        &mut self,
        family: &str,
        style: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// A family the host guarantees to have; the last rung of every
    /// font fallback chain.
    fn guaranteed_family(&self) -> String;

    /// Set text content and typography. The `(family, style)` pair
    /// must have been loaded.
    ///
    /// # Errors
    /// Host-specific failures.
    fn set_text(
        &mut self,
        node: &Self::NodeRef,
        characters: &str,
        family: &str,
        style: &TextStyle,
    ) -> Result<()>;

    /// # Errors
    /// Host-specific failures.
    fn set_auto_layout(&mut self, node: &Self::NodeRef, auto_layout: &AutoLayout) -> Result<()>;

    /// Create a shared style entity; returns its id.
    ///
    /// # Errors
    /// Host-specific failures.
    fn create_shared_style(&mut self, kind: SharedStyleKind, name: &str) -> Result<String>;

    /// Bind a node to a previously created shared style.
    ///
    /// # Errors
    /// Host-specific failures.
    fn bind_shared_style(
        &mut self,
        node: &Self::NodeRef,
        kind: SharedStyleKind,
        style_id: &str,
    ) -> Result<()>;
}
