//! Schema assembler: fold the traversal tree, settled assets, and
//! raster captures into one validated `SceneSchema`, then run style
//! promotion and optional component detection.

use crate::assets::{AcquiredAssets, AssetPatch};
use crate::components;
use crate::config::{CaptureConfig, CaptureOptions};
use crate::host::{DocumentInfo, PageHost};
use crate::raster::RasterOutcome;
use log::warn;
use scene::node::{NodeType, RasterReason};
use scene::registry::fingerprint;
use scene::registry::{ColorStyleEntry, EffectStyleEntry, TextStyleEntry};
use scene::{
    AnalyzedNode, CoordinateSystem, LayoutRect, Metadata, Paint, Rasterize, Rgba, SceneSchema,
    StyleRegistry, ViewportInfo,
};
use std::collections::HashMap;

/// Assemble the final schema.
pub fn assemble<H: PageHost>(
    host: &H,
    root: Option<AnalyzedNode>,
    acquired: AcquiredAssets,
    rasters: &HashMap<String, RasterOutcome>,
    options: &CaptureOptions,
    config: &CaptureConfig,
    incomplete: bool,
) -> SceneSchema {
    let info = host.document_info();
    let viewport = host.viewport();

    let mut root = root.unwrap_or_else(|| empty_root(&viewport));
    // Invariant: the root frame is sized to the viewport regardless of
    // what the html element reported.
    root.node_type = NodeType::Frame;
    root.absolute_layout = LayoutRect::new(0.0, 0.0, viewport.width, viewport.height);
    root.parent_id = None;

    apply_patches(&mut root, &acquired.patches, rasters);

    let mut schema = SceneSchema::new(metadata(&info, &viewport, incomplete), root);
    schema.assets = acquired.registry;
    schema.styles = promote_styles(&schema.root, config.style_promotion_threshold);
    if options.detect_components {
        let registry = components::detect_components(&schema.root, config.component_threshold);
        if !registry.definitions.is_empty() {
            schema.components = Some(registry);
        }
    }

    for violation in scene::validate(&schema) {
        warn!("schema invariant violated: {violation}");
    }
    schema
}

fn empty_root(viewport: &ViewportInfo) -> AnalyzedNode {
    let mut root = AnalyzedNode::new("root", NodeType::Frame, "html");
    root.absolute_layout = LayoutRect::new(0.0, 0.0, viewport.width, viewport.height);
    root
}

fn metadata(info: &DocumentInfo, viewport: &ViewportInfo, incomplete: bool) -> Metadata {
    Metadata {
        url: info.url.clone(),
        title: info.title.clone(),
        captured_at: chrono::Utc::now().to_rfc3339(),
        viewport: *viewport,
        capture_coordinate_system: CoordinateSystem::CssPixels,
        screenshot_scale: 1.0,
        incomplete,
    }
}

/// Walk the tree once, applying asset patches and raster outcomes.
fn apply_patches(
    node: &mut AnalyzedNode,
    patches: &HashMap<String, Vec<AssetPatch>>,
    rasters: &HashMap<String, RasterOutcome>,
) {
    if let Some(node_patches) = patches.get(&node.id) {
        // Background layers first, in their CSS layer order.
        let mut backgrounds: Vec<(usize, Paint)> = Vec::new();
        for patch in node_patches {
            match patch {
                AssetPatch::NodeImage {
                    hash,
                    intrinsic_size,
                    fit,
                } => {
                    node.image_hash = Some(hash.clone());
                    node.intrinsic_size = Some(*intrinsic_size);
                    node.aspect_ratio = intrinsic_size.aspect_ratio();
                    node.image_fit = Some(*fit);
                }
                AssetPatch::BackgroundPaint { hash, fit, ordinal } => {
                    backgrounds.push((
                        *ordinal,
                        Paint::Image {
                            image_hash: hash.clone(),
                            scale_mode: *fit,
                            opacity: 1.0,
                            visible: true,
                        },
                    ));
                }
                AssetPatch::Placeholder => {
                    if node.fills.is_empty() {
                        node.fills.push(Paint::solid(Rgba::PLACEHOLDER));
                    }
                    if node.rasterize.is_none() {
                        node.rasterize = Some(Rasterize {
                            reason: RasterReason::UnsupportedVisual,
                            data_url: None,
                        });
                    }
                }
            }
        }
        backgrounds.sort_by_key(|(ordinal, _)| *ordinal);
        node.fills
            .extend(backgrounds.into_iter().map(|(_, paint)| paint));
    }

    if let Some(outcome) = rasters.get(&node.id) {
        match outcome {
            RasterOutcome::Captured { data_url } => {
                let reason = node
                    .rasterize
                    .as_ref()
                    .map_or(RasterReason::UnsupportedVisual, |rasterize| {
                        rasterize.reason
                    });
                node.rasterize = Some(Rasterize {
                    reason,
                    data_url: Some(data_url.clone()),
                });
            }
            RasterOutcome::Failed => {
                if node.rasterize.is_none() {
                    node.rasterize = Some(Rasterize {
                        reason: RasterReason::UnsupportedVisual,
                        data_url: None,
                    });
                }
            }
        }
    }

    for child in &mut node.children {
        apply_patches(child, patches, rasters);
    }
}

/// Promote paints, text styles, and effect lists observed at least
/// `threshold` times into the shared registry. Nodes keep their
/// inline values; the importer binds by fingerprint.
fn promote_styles(root: &AnalyzedNode, threshold: u32) -> StyleRegistry {
    let mut color_counts: HashMap<String, (Paint, u32)> = HashMap::new();
    let mut text_counts: HashMap<String, (scene::TextStyle, u32)> = HashMap::new();
    let mut effect_counts: HashMap<String, (Vec<scene::Effect>, u32)> = HashMap::new();

    root.visit(&mut |node| {
        for paint in &node.fills {
            if let Paint::Solid { .. } = paint {
                let key = fingerprint::paint(paint);
                let entry = color_counts.entry(key).or_insert_with(|| (paint.clone(), 0));
                entry.1 += 1;
            }
        }
        if let Some(text_style) = &node.text_style {
            let key = fingerprint::text(text_style);
            let entry = text_counts
                .entry(key)
                .or_insert_with(|| (text_style.clone(), 0));
            entry.1 += 1;
        }
        if !node.effects.is_empty() {
            let key = fingerprint::effects(&node.effects);
            let entry = effect_counts
                .entry(key)
                .or_insert_with(|| (node.effects.clone(), 0));
            entry.1 += 1;
        }
    });

    let mut registry = StyleRegistry::default();
    let mut color_index = 0usize;
    for (key, (paint, count)) in sorted(color_counts) {
        if count >= threshold {
            color_index += 1;
            registry.colors.insert(
                key,
                ColorStyleEntry {
                    name: format!("Color {color_index}"),
                    paint,
                    usage_count: count,
                },
            );
        }
    }
    for (key, (text_style, count)) in sorted(text_counts) {
        if count >= threshold {
            registry.text_styles.insert(
                key,
                TextStyleEntry {
                    name: format!(
                        "{} {}px",
                        text_style.font_family, text_style.font_size
                    ),
                    text_style,
                    usage_count: count,
                },
            );
        }
    }
    let mut effect_index = 0usize;
    for (key, (effects, count)) in sorted(effect_counts) {
        if count >= threshold {
            effect_index += 1;
            registry.effects.insert(
                key,
                EffectStyleEntry {
                    name: format!("Effect {effect_index}"),
                    effects,
                    usage_count: count,
                },
            );
        }
    }
    registry
}

fn sorted<Value>(map: HashMap<String, Value>) -> Vec<(String, Value)> {
    let mut entries: Vec<(String, Value)> = map.into_iter().collect();
    entries.sort_by(|left, right| left.0.cmp(&right.0));
    entries
}
