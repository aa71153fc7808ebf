//! The node build pipeline. The per-node step order is a hard
//! contract: create, attach, resize, transform, blend, raster
//! override, paints, auto-layout, position, children. Applying a
//! transform must never short-circuit the later steps — skipping them
//! is what produces correctly placed but visually empty frames.

use crate::dedupe::StyleBinder;
use crate::fonts::FontCache;
use crate::host::{
    DesignHost, HostPaint, ImageAdjustments, RelativeTransform, TargetKind,
};
use crate::images::ImageCache;
use crate::stats::ImportStats;
use log::warn;
use scene::geometry::AbsoluteTransform;
use scene::node::NodeType;
use scene::{AnalyzedNode, BlendMode, Error, ImageFit, LayoutRect, Paint, Result, Rgba};
use std::future::Future;
use std::pin::Pin;

pub struct BuildContext<'import, H: DesignHost> {
    pub host: &'import mut H,
    pub fonts: &'import mut FontCache,
    pub images: &'import ImageCache<H::ImageHandle>,
    pub binder: &'import StyleBinder,
    pub stats: &'import mut ImportStats,
    /// Uniform divisor for device-pixel captures; 1.0 for CSS pixels.
    pub scale: f64,
}

impl<H: DesignHost> BuildContext<'_, H> {
    fn rescale(&self, rect: LayoutRect) -> LayoutRect {
        if self.scale > 1.0 {
            rect.scaled(self.scale)
        } else {
            rect
        }
    }

    /// Build one node and its subtree under `parent`. Returns the
    /// created node reference so callers can reposition top-level
    /// frames.
    ///
    /// # Errors
    /// Any step may fail; the caller records the failure and moves to
    /// the next sibling.
    pub fn build_node<'task>(
        &'task mut self,
        node: &'task AnalyzedNode,
        parent: &'task H::NodeRef,
        parent_rect: &'task LayoutRect,
        parent_is_auto_layout: bool,
    ) -> Pin<Box<dyn Future<Output = Result<H::NodeRef>> + 'task>> {
        Box::pin(async move {
            // 1. Create the node of the mapped target kind.
            let kind = target_kind(node);
            let target = self.host.create_node(kind, &node.name)?;

            // 2. Attach it to its parent.
            self.host.append_child(parent, &target)?;

            // 3. Resize to the untransformed box.
            let rect = self.rescale(node.absolute_layout);
            self.host
                .resize(&target, rect.width.round().max(1.0), rect.height.round().max(1.0))?;

            // 4. Apply the transform. The matrix carries position, so
            //    step 9 skips positioning for these nodes. Everything
            //    below still runs for them.
            let mut matrix_applied = false;
            if let Some(transform) = &node.absolute_transform {
                let rows = relative_rows(transform, &rect, parent_rect, self.scale);
                self.host.set_relative_transform(&target, rows)?;
                matrix_applied = true;
            }

            // 5. Compositing: blend mode, opacity, and the image-only
            //    filter trio prepared for the paint step.
            if node.blend_mode != BlendMode::Normal {
                self.host.set_blend_mode(&target, node.blend_mode)?;
            }
            if node.opacity < 1.0 {
                self.host.set_opacity(&target, node.opacity)?;
            }
            let adjustments = image_adjustments(node);

            // 6. Rasterization override: a captured data URL replaces
            //    every other fill source for this node.
            let mut fills_overridden = false;
            if let Some(rasterize) = &node.rasterize {
                if let Some(data_url) = &rasterize.data_url {
                    match self.apply_raster_override(&target, data_url).await {
                        Ok(()) => {
                            fills_overridden = true;
                            self.stats.rasterized_nodes += 1;
                        }
                        Err(error) => {
                            warn!("raster override failed for {}: {error}", node.id);
                            self.set_placeholder_fill(&target)?;
                            fills_overridden = true;
                        }
                    }
                } else {
                    // Flagged but uncaptured: placeholder per policy.
                    self.set_placeholder_fill(&target)?;
                    fills_overridden = true;
                }
            }

            // 7. Paints and geometry decoration not already applied.
            if !fills_overridden {
                self.apply_fills(node, &target, adjustments).await?;
            }
            if !node.strokes.is_empty() {
                let stroke_paints = self.convert_paints(&node.strokes, ImageAdjustments::default());
                self.host.set_strokes(
                    &target,
                    stroke_paints,
                    node.stroke_weight.unwrap_or(1.0),
                    node.stroke_align.unwrap_or_default(),
                )?;
            }
            if let Some(radius) = node.corner_radius {
                self.host.set_corner_radius(&target, radius)?;
            }
            if !node.effects.is_empty() {
                self.host.set_effects(&target, node.effects.clone())?;
            }
            if node.clips_content {
                self.host.set_clips_content(&target, true)?;
            }
            if node.node_type == NodeType::Text
                && let (Some(characters), Some(text_style)) = (&node.characters, &node.text_style)
            {
                let family = self.fonts.resolve(&mut *self.host, text_style).await;
                self.host.set_text(&target, characters, &family, text_style)?;
            }
            self.binder.bind(&mut *self.host, node, &target)?;

            // 8. Auto layout. Children added after this use
            //    stack-relative positioning.
            let mut is_auto_layout = false;
            if let Some(auto_layout) = &node.auto_layout {
                self.host.set_auto_layout(&target, auto_layout)?;
                is_auto_layout = true;
            }

            // 9. Position relative to the parent. Transform rows
            //    already carry position; auto-layout parents place by
            //    insertion order.
            if !matrix_applied && !parent_is_auto_layout {
                let x = (rect.left - parent_rect.left).round();
                let y = (rect.top - parent_rect.top).round();
                self.host.set_position(&target, x, y)?;
            }

            // 10. Children in paint order; across stacking contexts
            //     the effective z-index decides.
            for child in z_sorted(&node.children) {
                match self.build_node(child, &target, &rect, is_auto_layout).await {
                    Ok(_) => self.stats.created_nodes += 1,
                    Err(error) => {
                        warn!("node {} failed to build: {error}", child.id);
                        self.stats.record_failure(&child.id, &error);
                    }
                }
            }

            Ok(target)
        })
    }

    async fn apply_raster_override(&mut self, target: &H::NodeRef, data_url: &str) -> Result<()> {
        let (_, bytes) = scene::envelope::parse_data_url(data_url).ok_or_else(|| {
            Error::NodeBuildFailed {
                node_id: "raster".to_owned(),
                cause: "malformed raster data URL".to_owned(),
            }
        })?;
        // Rasterized captures are pixel-unique; handles are created
        // per node, never deduped.
        let handle = self.host.create_image(&bytes).await?;
        self.host.set_fills(
            target,
            vec![HostPaint::Image {
                handle,
                scale_mode: ImageFit::Fill,
                opacity: 1.0,
                adjustments: ImageAdjustments::default(),
            }],
        )
    }

    async fn apply_fills(
        &mut self,
        node: &AnalyzedNode,
        target: &H::NodeRef,
        adjustments: ImageAdjustments,
    ) -> Result<()> {
        let mut fills = self.convert_paints(&node.fills, adjustments);

        // IMAGE nodes whose paint was not an explicit fill layer get
        // one synthesized from the registry reference.
        let has_image_fill = fills
            .iter()
            .any(|paint| matches!(paint, HostPaint::Image { .. }));
        if node.node_type == NodeType::Image && !has_image_fill {
            if let Some(hash) = &node.image_hash {
                let fit = node.image_fit.unwrap_or(ImageFit::Fill);
                match self.images.get(hash) {
                    Some(handle) => {
                        fills.push(HostPaint::Image {
                            handle,
                            scale_mode: fit,
                            opacity: 1.0,
                            adjustments,
                        });
                        // Intrinsic-size mode: the node snaps back to
                        // the image's natural dimensions.
                        if fit == ImageFit::Crop
                            && let Some(intrinsic) = node.intrinsic_size
                        {
                            self.host.resize(
                                target,
                                intrinsic.width.round().max(1.0),
                                intrinsic.height.round().max(1.0),
                            )?;
                        }
                    }
                    None => {
                        warn!("image handle missing for {hash}; placeholder fill");
                        fills.push(HostPaint::Solid {
                            color: Rgba::PLACEHOLDER,
                            opacity: 1.0,
                        });
                    }
                }
            } else if fills.is_empty() {
                fills.push(HostPaint::Solid {
                    color: Rgba::PLACEHOLDER,
                    opacity: 1.0,
                });
            }
        }

        if fills.is_empty() {
            return Ok(());
        }
        self.host.set_fills(target, fills)
    }

    fn convert_paints(
        &self,
        paints: &[Paint],
        adjustments: ImageAdjustments,
    ) -> Vec<HostPaint<H::ImageHandle>> {
        paints
            .iter()
            .filter(|paint| paint.is_visible())
            .filter_map(|paint| match paint {
                Paint::Solid { color, opacity, .. } => Some(HostPaint::Solid {
                    color: *color,
                    opacity: *opacity,
                }),
                Paint::GradientLinear {
                    angle,
                    stops,
                    opacity,
                    ..
                } => Some(HostPaint::GradientLinear {
                    angle: *angle,
                    stops: stops.clone(),
                    opacity: *opacity,
                }),
                Paint::GradientRadial {
                    center,
                    stops,
                    opacity,
                    ..
                } => Some(HostPaint::GradientRadial {
                    center: *center,
                    stops: stops.clone(),
                    opacity: *opacity,
                }),
                Paint::Image {
                    image_hash,
                    scale_mode,
                    opacity,
                    ..
                } => match self.images.get(image_hash) {
                    Some(handle) => Some(HostPaint::Image {
                        handle,
                        scale_mode: *scale_mode,
                        opacity: *opacity,
                        adjustments,
                    }),
                    None => {
                        warn!("paint references unknown image {image_hash}");
                        Some(HostPaint::Solid {
                            color: Rgba::PLACEHOLDER,
                            opacity: 1.0,
                        })
                    }
                },
            })
            .collect()
    }

    fn set_placeholder_fill(&mut self, target: &H::NodeRef) -> Result<()> {
        self.host.set_fills(
            target,
            vec![HostPaint::Solid {
                color: Rgba::PLACEHOLDER,
                opacity: 1.0,
            }],
        )
    }
}

/// Target node kind per analyzed type. IMAGE nodes become rectangles
/// carrying an image paint; pseudo-elements become frames so their
/// generated children nest.
fn target_kind(node: &AnalyzedNode) -> TargetKind {
    match node.node_type {
        NodeType::Frame | NodeType::Pseudo => TargetKind::Frame,
        NodeType::Text => TargetKind::Text,
        NodeType::Rectangle | NodeType::Image => TargetKind::Rectangle,
        NodeType::Vector => TargetKind::Vector,
    }
}

/// Compose the node's relative transform rows from the CSS matrix,
/// its normalized origin, and the untransformed box position. CSS
/// rotates about the origin; the target model rotates about the
/// top-left corner, so the origin shift is folded into translation.
fn relative_rows(
    transform: &AbsoluteTransform,
    rect: &LayoutRect,
    parent_rect: &LayoutRect,
    scale: f64,
) -> RelativeTransform {
    let [a, b, c, d, tx, ty] = transform.matrix;
    let divisor = if scale > 1.0 { scale } else { 1.0 };
    let (tx, ty) = (tx / divisor, ty / divisor);
    let origin_x = transform.origin.x * rect.width;
    let origin_y = transform.origin.y * rect.height;
    let position_x = rect.left - parent_rect.left;
    let position_y = rect.top - parent_rect.top;
    [
        [
            a,
            c,
            position_x + origin_x - (a * origin_x + c * origin_y) + tx,
        ],
        [
            b,
            d,
            position_y + origin_y - (b * origin_x + d * origin_y) + ty,
        ],
    ]
}

/// Stable z-index sort: schema order within a stacking context,
/// effective z-index across.
fn z_sorted(children: &[AnalyzedNode]) -> Vec<&AnalyzedNode> {
    let mut ordered: Vec<&AnalyzedNode> = children.iter().collect();
    ordered.sort_by_key(|child| child.effective_z_index());
    ordered
}

/// Image-only filter adjustments from the advisory filter string.
fn image_adjustments(node: &AnalyzedNode) -> ImageAdjustments {
    let mut adjustments = ImageAdjustments::default();
    if node.node_type != NodeType::Image {
        return adjustments;
    }
    let Some(filter) = &node.css_filter else {
        return adjustments;
    };
    for function in filter.split(')') {
        let Some((name, argument)) = function.trim().split_once('(') else {
            continue;
        };
        let value = argument
            .trim()
            .strip_suffix('%')
            .map_or_else(|| argument.trim().parse::<f64>(), |percent| {
                percent.parse::<f64>().map(|number| number / 100.0)
            })
            .unwrap_or(1.0);
        match name.trim() {
            "brightness" => adjustments.brightness = value,
            "contrast" => adjustments.contrast = value,
            "saturate" => adjustments.saturation = value,
            _ => {}
        }
    }
    adjustments
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene::Point;

    #[test]
    fn z_sort_is_stable_within_equal_indices() {
        let mut first = AnalyzedNode::new("a", NodeType::Rectangle, "div");
        first.layout_context.z_index = None;
        let mut second = AnalyzedNode::new("b", NodeType::Rectangle, "div");
        second.layout_context.z_index = None;
        let mut floating = AnalyzedNode::new("c", NodeType::Rectangle, "div");
        floating.layout_context.z_index = Some(-1);
        let children = vec![first, second, floating];
        let ordered: Vec<&str> = z_sorted(&children)
            .into_iter()
            .map(|node| node.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["c", "a", "b"]);
    }

    #[test]
    fn transform_rows_fold_origin_into_translation() {
        let transform = AbsoluteTransform {
            // 90° rotation.
            matrix: [0.0, 1.0, -1.0, 0.0, 0.0, 0.0],
            origin: Point::new(0.5, 0.5),
        };
        let rect = LayoutRect::new(100.0, 50.0, 40.0, 20.0);
        let parent = LayoutRect::new(0.0, 0.0, 800.0, 600.0);
        let rows = relative_rows(&transform, &rect, &parent, 1.0);
        // Linear part is the rotation.
        assert_eq!(rows[0][0], 0.0);
        assert_eq!(rows[0][1], -1.0);
        // Center stays fixed: ox=20, oy=10 → tx = 100+20-(0*20-1*10)=130.
        assert_eq!(rows[0][2], 130.0);
        assert_eq!(rows[1][2], 50.0 + 10.0 - 20.0);
    }

    #[test]
    fn image_adjustments_parse_from_filter_string() {
        let mut node = AnalyzedNode::new("img", NodeType::Image, "img");
        node.css_filter = Some("brightness(1.2) saturate(150%)".to_owned());
        let adjustments = image_adjustments(&node);
        assert_eq!(adjustments.brightness, 1.2);
        assert_eq!(adjustments.saturation, 1.5);
        assert_eq!(adjustments.contrast, 1.0);
    }
}
