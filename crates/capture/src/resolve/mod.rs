//! Style & geometry resolver: computed style → schema-shaped visual
//! fields, one element at a time, with the map-or-rasterize decision.

pub mod background;
pub mod border;
pub mod color;
pub mod gradient;
pub mod shadow;
pub mod text;
pub mod transform;

use crate::host::PageHost;
use background::{BackgroundLayer, FitOutcome};
use border::BorderResolution;
use scene::geometry::AbsoluteTransform;
use scene::node::{LayoutContext, RasterReason};
use scene::paint::SideWeights;
use scene::{BlendMode, CornerRadius, Effect, ImageFit, LayoutRect, Paint, Rgba, StrokeAlign};
use shadow::FilterFunction;
use transform::TransformOutcome;

/// An image layer that still needs asset acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundImageRequest {
    pub url: String,
    pub fit: ImageFit,
}

/// Synthetic edge rectangle emitted for an asymmetric border.
#[derive(Debug, Clone, PartialEq)]
pub struct BorderEdge {
    pub rect: LayoutRect,
    pub color: Rgba,
    pub side: &'static str,
}

/// Everything the resolver derives for one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedVisual {
    /// Paint order: earlier entries paint first (bottom-most).
    pub fills: Vec<Paint>,
    /// Image layers pending acquisition; each becomes an IMAGE paint
    /// appended after `fills` once its asset resolves.
    pub background_images: Vec<BackgroundImageRequest>,
    pub strokes: Vec<Paint>,
    pub stroke_weight: Option<f64>,
    pub stroke_align: Option<StrokeAlign>,
    pub stroke_side_weights: Option<SideWeights>,
    /// Edge rectangles to emit as synthetic children when the border
    /// could not be expressed as one stroke.
    pub border_edges: Vec<BorderEdge>,
    pub effects: Vec<Effect>,
    pub corner_radius: Option<CornerRadius>,
    pub clips_content: bool,
    pub opacity: f64,
    pub blend_mode: BlendMode,
    pub isolation: bool,
    pub absolute_transform: Option<AbsoluteTransform>,
    pub layout_context: LayoutContext,
    /// Set when any feature forces the map-or-rasterize fallback.
    pub raster_reason: Option<RasterReason>,
    /// Representable image-only filter functions, meaningful on IMAGE
    /// nodes.
    pub image_filters: Vec<FilterFunction>,
    pub css_filter: Option<String>,
    pub mix_blend_mode: Option<String>,
}

impl ResolvedVisual {
    fn mark_raster(&mut self, reason: RasterReason) {
        // First cause wins; later findings do not overwrite it.
        if self.raster_reason.is_none() {
            self.raster_reason = Some(reason);
        }
    }
}

/// Resolve one element's computed style against the schema model.
/// `is_image_node` widens the representable filter set to the
/// image-only trio.
pub fn resolve_element<H: PageHost>(
    host: &H,
    element: &H::Element,
    rect: &LayoutRect,
    is_image_node: bool,
) -> ResolvedVisual {
    let read = |property: &str| host.computed_style(element, property);
    resolve_from(&read, rect, is_image_node)
}

/// Style-lookup-driven core, shared with pseudo-element and forced
/// state resolution.
pub fn resolve_from(
    read: &impl Fn(&str) -> String,
    rect: &LayoutRect,
    is_image_node: bool,
) -> ResolvedVisual {
    let mut resolved = ResolvedVisual {
        opacity: 1.0,
        ..ResolvedVisual::default()
    };

    resolve_fills(read, &mut resolved);
    resolve_strokes(read, rect, &mut resolved);
    resolve_corners(read, rect, &mut resolved);
    resolve_effects(read, is_image_node, &mut resolved);
    resolve_compositing(read, &mut resolved);
    resolve_transform_fields(read, rect, &mut resolved);
    resolve_layout_context(read, &mut resolved);

    resolved
}

fn resolve_fills(read: &impl Fn(&str) -> String, resolved: &mut ResolvedVisual) {
    if !color::is_transparent(&read("background-color"))
        && let Some(background) = color::parse_css_color(&read("background-color"))
    {
        resolved.fills.push(Paint::solid(background));
    }

    let layers = background::parse_background_layers(&read("background-image"));
    if layers.is_empty() {
        return;
    }
    let fit = match background::reduce_background_fit(
        &read("background-size"),
        &read("background-repeat"),
        &read("background-position"),
    ) {
        FitOutcome::Fit(fit) => fit,
        FitOutcome::Unrepresentable => {
            resolved.mark_raster(RasterReason::UnsupportedVisual);
            ImageFit::Fill
        }
    };

    // CSS lists the top layer first; schema fills paint bottom-up, so
    // layers are appended in reverse.
    for layer in layers.into_iter().rev() {
        match layer {
            BackgroundLayer::Gradient(raw) => match gradient::parse_gradient(&raw) {
                Some(paint) => resolved.fills.push(paint),
                None => resolved.mark_raster(RasterReason::UnsupportedVisual),
            },
            BackgroundLayer::Url(url) => {
                resolved
                    .background_images
                    .push(BackgroundImageRequest { url, fit });
            }
            BackgroundLayer::Unsupported(_) => {
                resolved.mark_raster(RasterReason::UnsupportedVisual);
            }
        }
    }
}

fn resolve_strokes(
    read: &impl Fn(&str) -> String,
    rect: &LayoutRect,
    resolved: &mut ResolvedVisual,
) {
    match border::resolve_border(read) {
        BorderResolution::None => {}
        BorderResolution::Uniform {
            paint,
            weight,
            align,
        } => {
            resolved.strokes.push(paint);
            resolved.stroke_weight = Some(weight);
            resolved.stroke_align = Some(align);
        }
        BorderResolution::Decomposed { sides, weights } => {
            resolved.stroke_side_weights = Some(weights);
            resolved.border_edges = border::edge_rectangles(rect, &sides)
                .into_iter()
                .map(|(edge_rect, edge_color, side)| BorderEdge {
                    rect: edge_rect,
                    color: edge_color,
                    side,
                })
                .collect();
        }
    }
}

fn resolve_corners(
    read: &impl Fn(&str) -> String,
    rect: &LayoutRect,
    resolved: &mut ResolvedVisual,
) {
    let corner = |name: &str| {
        let value = read(name);
        let trimmed = value.trim();
        // Computed radii are `Npx`, or a percentage of the box. Two-value
        // (elliptical) radii keep their first component.
        let first = trimmed.split_whitespace().next().unwrap_or("");
        if let Some(percent) = first.strip_suffix('%') {
            percent
                .parse::<f64>()
                .map(|number| number / 100.0 * rect.width)
                .unwrap_or(0.0)
        } else {
            shadow::parse_px(first).unwrap_or(0.0)
        }
    };
    resolved.corner_radius = CornerRadius::from_corners(
        corner("border-top-left-radius"),
        corner("border-top-right-radius"),
        corner("border-bottom-right-radius"),
        corner("border-bottom-left-radius"),
    );
}

fn resolve_effects(
    read: &impl Fn(&str) -> String,
    is_image_node: bool,
    resolved: &mut ResolvedVisual,
) {
    resolved.effects = shadow::parse_box_shadow(&read("box-shadow"));

    let filter_value = read("filter");
    let functions = shadow::parse_filter_list(&filter_value);
    if !functions.is_empty() {
        resolved.css_filter = Some(filter_value.trim().to_owned());
    }
    for function in functions {
        match function {
            FilterFunction::Blur(radius) => resolved.effects.push(Effect::LayerBlur {
                radius,
                visible: true,
            }),
            FilterFunction::DropShadow(effect) => resolved.effects.push(effect),
            FilterFunction::Brightness(_)
            | FilterFunction::Contrast(_)
            | FilterFunction::Saturate(_) => {
                if is_image_node {
                    resolved.image_filters.push(function);
                } else {
                    resolved.mark_raster(RasterReason::Filter);
                }
            }
            FilterFunction::Unsupported(_) => resolved.mark_raster(RasterReason::Filter),
        }
    }

    // backdrop-filter: only a pure blur maps.
    let backdrop_value = read("backdrop-filter");
    let backdrop = shadow::parse_filter_list(&backdrop_value);
    for function in backdrop {
        match function {
            FilterFunction::Blur(radius) => resolved.effects.push(Effect::BackgroundBlur {
                radius,
                visible: true,
            }),
            _ => resolved.mark_raster(RasterReason::Filter),
        }
    }
}

fn resolve_compositing(read: &impl Fn(&str) -> String, resolved: &mut ResolvedVisual) {
    resolved.opacity = read("opacity").trim().parse().unwrap_or(1.0);

    let blend_value = read("mix-blend-mode");
    let blend_trimmed = blend_value.trim();
    if !blend_trimmed.is_empty() && blend_trimmed != "normal" {
        resolved.mix_blend_mode = Some(blend_trimmed.to_owned());
    }
    match BlendMode::from_css(blend_trimmed) {
        Some(mode) => resolved.blend_mode = mode,
        None => resolved.mark_raster(RasterReason::BlendMode),
    }

    resolved.isolation = read("isolation").trim() == "isolate";
}

fn resolve_transform_fields(
    read: &impl Fn(&str) -> String,
    rect: &LayoutRect,
    resolved: &mut ResolvedVisual,
) {
    let raw = read("transform");
    match transform::parse_transform(&raw) {
        TransformOutcome::Identity => {}
        TransformOutcome::Affine(matrix) => {
            resolved.absolute_transform = Some(AbsoluteTransform {
                matrix,
                origin: transform::parse_transform_origin(&read("transform-origin"), rect),
            });
        }
        TransformOutcome::Degenerate => resolved.mark_raster(RasterReason::UnsupportedVisual),
    }
    if !raw.trim().is_empty() && raw.trim() != "none" {
        resolved.layout_context.transform = Some(raw.trim().to_owned());
    }
}

fn resolve_layout_context(read: &impl Fn(&str) -> String, resolved: &mut ResolvedVisual) {
    let position_value = read("position");
    let position = if position_value.trim().is_empty() {
        "static".to_owned()
    } else {
        position_value.trim().to_owned()
    };
    let z_index = read("z-index").trim().parse::<i32>().ok();
    let overflow_value = read("overflow");
    let overflow = if overflow_value.trim().is_empty() {
        "visible".to_owned()
    } else {
        overflow_value.trim().to_owned()
    };
    resolved.clips_content = matches!(overflow.as_str(), "hidden" | "clip" | "auto" | "scroll");

    let positioned = position != "static";
    let will_change = read("will-change");
    let stacking_context = resolved.opacity < 1.0
        || resolved.absolute_transform.is_some()
        || resolved.css_filter.is_some()
        || resolved.mix_blend_mode.is_some()
        || resolved.isolation
        || (positioned && z_index.is_some())
        || will_change.contains("transform")
        || will_change.contains("opacity");

    resolved.layout_context = LayoutContext {
        position,
        z_index,
        overflow,
        transform: resolved.layout_context.transform.take(),
        stacking_context,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve_styles(entries: &[(&str, &str)]) -> ResolvedVisual {
        let map: HashMap<String, String> = entries
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        let read = move |name: &str| map.get(name).cloned().unwrap_or_default();
        resolve_from(&read, &LayoutRect::new(0.0, 0.0, 40.0, 40.0), false)
    }

    #[test]
    fn rotated_badge_with_shadow_resolves_exactly() {
        let resolved = resolve_styles(&[
            ("transform", "rotate(45deg)"),
            ("box-shadow", "rgba(0, 0, 0, 0.3) 0px 2px 4px 0px"),
            ("background-color", "rgb(255, 0, 0)"),
        ]);
        assert!(resolved.raster_reason.is_none());
        assert_eq!(resolved.fills.len(), 1);
        assert_eq!(resolved.effects.len(), 1);
        let matrix = resolved.absolute_transform.unwrap().matrix;
        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert!((matrix[0] - expected).abs() < 1e-4);
        assert!((matrix[1] - expected).abs() < 1e-4);
        assert!(resolved.layout_context.stacking_context);
    }

    #[test]
    fn unrepresentable_filter_forces_rasterization() {
        let resolved = resolve_styles(&[
            ("filter", "hue-rotate(90deg) blur(3px)"),
            ("background-color", "rgb(10, 10, 10)"),
        ]);
        assert_eq!(resolved.raster_reason, Some(RasterReason::Filter));
        assert_eq!(resolved.css_filter.as_deref(), Some("hue-rotate(90deg) blur(3px)"));
        // The representable blur still resolves for the advisory path.
        assert!(resolved
            .effects
            .iter()
            .any(|effect| matches!(effect, Effect::LayerBlur { radius, .. } if *radius == 3.0)));
    }

    #[test]
    fn image_only_filters_stay_on_image_nodes() {
        let map: HashMap<String, String> =
            [("filter".to_owned(), "brightness(1.4)".to_owned())].into();
        let read = move |name: &str| map.get(name).cloned().unwrap_or_default();
        let on_image = resolve_from(&read, &LayoutRect::new(0.0, 0.0, 10.0, 10.0), true);
        assert!(on_image.raster_reason.is_none());
        assert_eq!(on_image.image_filters.len(), 1);
    }

    #[test]
    fn unsupported_blend_mode_forces_rasterization() {
        let resolved = resolve_styles(&[("mix-blend-mode", "plus-lighter")]);
        assert_eq!(resolved.raster_reason, Some(RasterReason::BlendMode));
        assert_eq!(resolved.mix_blend_mode.as_deref(), Some("plus-lighter"));
    }

    #[test]
    fn gradient_layers_append_in_paint_order() {
        let resolved = resolve_styles(&[
            ("background-color", "rgb(255, 255, 255)"),
            (
                "background-image",
                "linear-gradient(rgb(0, 0, 0), rgb(255, 0, 0)), linear-gradient(rgb(1, 2, 3), rgb(4, 5, 6))",
            ),
        ]);
        // Solid color first (bottom), then the second CSS layer, then
        // the first (top-most paints last).
        assert_eq!(resolved.fills.len(), 3);
        assert!(matches!(resolved.fills[0], Paint::Solid { .. }));
    }

    #[test]
    fn overflow_hidden_clips() {
        let resolved = resolve_styles(&[("overflow", "hidden")]);
        assert!(resolved.clips_content);
        let visible = resolve_styles(&[]);
        assert!(!visible.clips_content);
    }
}
