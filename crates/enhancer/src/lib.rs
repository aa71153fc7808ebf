//! Post-capture enhancer: a pure, deterministic, idempotent
//! `SceneSchema → SceneSchema` rewriter. Every annotation is additive
//! — structure, ids, and child order never change, and a field that
//! is already set is never overwritten (which is what makes a second
//! pass a no-op).

use scene::node::SuggestedAutoLayout;
use scene::{AnalyzedNode, LayoutRect, NodeType, Paint, Rgba, SceneSchema};
use serde::{Deserialize, Serialize};

/// One recognized word with its bounding box in capture coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrWord {
    pub text: String,
    pub rect: LayoutRect,
}

/// One detected component bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedComponent {
    /// Label such as `BUTTON`, `CARD`, `INPUT`.
    pub label: String,
    pub rect: LayoutRect,
    pub confidence: f64,
}

/// Detected type scale: ascending font sizes considered canonical.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeScale {
    pub sizes: Vec<f64>,
}

/// External analysis inputs. Every field is optional; a missing input
/// skips its annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiContext {
    pub ocr: Option<Vec<OcrWord>>,
    pub ml_components: Option<Vec<DetectedComponent>>,
    pub palette: Option<Vec<Rgba>>,
    pub typography: Option<TypeScale>,
    pub spacing_scale: Option<Vec<f64>>,
}

/// Inferred fills are rationed per capture.
const MAX_INFERRED_FILLS: usize = 12;
/// No inferred fill on anything larger than this share of the
/// viewport.
const MAX_FILL_VIEWPORT_SHARE: f64 = 0.05;
/// Minimum overlap share for OCR/ML boxes to attach to a node.
const MIN_OVERLAP_SHARE: f64 = 0.5;

/// Enhance a schema with the available analysis inputs.
#[must_use]
pub fn enhance(mut schema: SceneSchema, context: &AiContext) -> SceneSchema {
    let viewport_area =
        schema.metadata.viewport.width * schema.metadata.viewport.height;
    let mut fill_budget = MAX_INFERRED_FILLS;
    annotate(&mut schema.root, context, viewport_area, &mut fill_budget);
    schema
}

fn annotate(
    node: &mut AnalyzedNode,
    context: &AiContext,
    viewport_area: f64,
    fill_budget: &mut usize,
) {
    if let Some(words) = &context.ocr {
        annotate_ocr(node, words);
    }
    if let Some(components) = &context.ml_components {
        annotate_components(node, components);
    }
    if let Some(scale) = &context.typography {
        snap_font_size(node, scale);
    }
    if let Some(palette) = &context.palette {
        infer_fill(node, palette, viewport_area, fill_budget);
    }
    suggest_auto_layout(node);

    for child in &mut node.children {
        annotate(child, context, viewport_area, fill_budget);
    }
}

/// OCR text lands on image-like nodes that carry no text of their
/// own.
fn annotate_ocr(node: &mut AnalyzedNode, words: &[OcrWord]) {
    let image_like = node.node_type == NodeType::Image || node.rasterize.is_some();
    if !image_like || node.ocr_text.is_some() || node.characters.is_some() {
        return;
    }
    let mut matched: Vec<&OcrWord> = words
        .iter()
        .filter(|word| overlap_share(&word.rect, &node.absolute_layout) >= MIN_OVERLAP_SHARE)
        .collect();
    if matched.is_empty() {
        return;
    }
    // Reading order: top to bottom, then left to right.
    matched.sort_by(|left, right| {
        left.rect
            .top
            .partial_cmp(&right.rect.top)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                left.rect
                    .left
                    .partial_cmp(&right.rect.left)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
    let text = matched
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    node.ocr_text = Some(text);
}

fn annotate_components(node: &mut AnalyzedNode, components: &[DetectedComponent]) {
    if node.ml_classification.is_some() {
        return;
    }
    let best = components
        .iter()
        .filter(|component| {
            overlap_share(&component.rect, &node.absolute_layout) >= MIN_OVERLAP_SHARE
                && overlap_share(&node.absolute_layout, &component.rect) >= MIN_OVERLAP_SHARE
        })
        .max_by(|left, right| {
            left.confidence
                .partial_cmp(&right.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    if let Some(component) = best {
        node.ml_classification = Some(component.label.clone());
        if node.suggested_component_type.is_none() {
            node.suggested_component_type = Some(component.label.clone());
        }
    }
}

/// Normalize font sizes onto the detected scale, preserving the
/// original. Already-normalized nodes are left alone.
fn snap_font_size(node: &mut AnalyzedNode, scale: &TypeScale) {
    if scale.sizes.is_empty() || node.original_font_size.is_some() {
        return;
    }
    let Some(text_style) = &mut node.text_style else {
        return;
    };
    let current = text_style.font_size;
    let nearest = scale
        .sizes
        .iter()
        .copied()
        .min_by(|left, right| {
            (left - current)
                .abs()
                .partial_cmp(&(right - current).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(current);
    if nearest != current {
        node.original_font_size = Some(current);
        text_style.font_size = nearest;
    }
}

/// A small, fill-less leaf may take the nearest palette color. Large
/// containers never get guessed backgrounds, and the per-capture
/// budget caps the total.
fn infer_fill(
    node: &mut AnalyzedNode,
    palette: &[Rgba],
    viewport_area: f64,
    fill_budget: &mut usize,
) {
    if *fill_budget == 0
        || palette.is_empty()
        || !node.fills.is_empty()
        || node.node_type != NodeType::Rectangle
        || !node.children.is_empty()
    {
        return;
    }
    if viewport_area <= 0.0
        || node.absolute_layout.area() / viewport_area > MAX_FILL_VIEWPORT_SHARE
    {
        return;
    }
    // Deterministic pick: the first palette entry.
    node.fills = vec![Paint::solid(palette[0])];
    *fill_budget -= 1;
}

/// Children laid out on one axis suggest an auto-layout direction.
fn suggest_auto_layout(node: &mut AnalyzedNode) {
    const TOLERANCE: f64 = 4.0;
    if node.suggested_auto_layout.is_some()
        || node.auto_layout.is_some()
        || node.children.len() < 2
    {
        return;
    }
    let rects: Vec<LayoutRect> = node
        .children
        .iter()
        .map(|child| child.absolute_layout)
        .collect();
    let horizontal = rects
        .windows(2)
        .all(|pair| {
            (pair[0].top - pair[1].top).abs() <= TOLERANCE && pair[1].left >= pair[0].right()
        });
    let vertical = rects
        .windows(2)
        .all(|pair| {
            (pair[0].left - pair[1].left).abs() <= TOLERANCE && pair[1].top >= pair[0].bottom()
        });
    if horizontal {
        node.suggested_auto_layout = Some(SuggestedAutoLayout {
            mode: scene::node::AutoLayoutMode::Horizontal,
        });
    } else if vertical {
        node.suggested_auto_layout = Some(SuggestedAutoLayout {
            mode: scene::node::AutoLayoutMode::Vertical,
        });
    }
}

/// Share of `inner`'s area covered by `outer`.
fn overlap_share(inner: &LayoutRect, outer: &LayoutRect) -> f64 {
    let width = (inner.right().min(outer.right()) - inner.left.max(outer.left)).max(0.0);
    let height = (inner.bottom().min(outer.bottom()) - inner.top.max(outer.top)).max(0.0);
    let inner_area = inner.area();
    if inner_area <= 0.0 {
        return 0.0;
    }
    width * height / inner_area
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene::{Metadata, ViewportInfo};

    fn base_schema() -> SceneSchema {
        let mut root = AnalyzedNode::new("root", NodeType::Frame, "html");
        root.absolute_layout = LayoutRect::new(0.0, 0.0, 1000.0, 800.0);
        SceneSchema::new(
            Metadata {
                viewport: ViewportInfo {
                    width: 1000.0,
                    height: 800.0,
                    device_pixel_ratio: 1.0,
                    layout_viewport_width: 1000.0,
                    layout_viewport_height: 800.0,
                    scroll_height: 800.0,
                },
                ..Metadata::default()
            },
            root,
        )
    }

    fn image_node(id: &str, rect: LayoutRect) -> AnalyzedNode {
        let mut node = AnalyzedNode::new(id, NodeType::Image, "img");
        node.parent_id = Some("root".to_owned());
        node.absolute_layout = rect;
        node
    }

    #[test]
    fn ocr_attaches_in_reading_order() {
        let mut schema = base_schema();
        schema
            .root
            .children
            .push(image_node("hero", LayoutRect::new(0.0, 0.0, 400.0, 200.0)));

        let context = AiContext {
            ocr: Some(vec![
                OcrWord {
                    text: "world".to_owned(),
                    rect: LayoutRect::new(120.0, 50.0, 80.0, 20.0),
                },
                OcrWord {
                    text: "hello".to_owned(),
                    rect: LayoutRect::new(20.0, 50.0, 80.0, 20.0),
                },
                OcrWord {
                    text: "offscreen".to_owned(),
                    rect: LayoutRect::new(900.0, 700.0, 50.0, 20.0),
                },
            ]),
            ..AiContext::default()
        };
        let enhanced = enhance(schema, &context);
        assert_eq!(
            enhanced.root.children[0].ocr_text.as_deref(),
            Some("hello world")
        );
    }

    #[test]
    fn large_containers_never_get_inferred_fills() {
        let mut schema = base_schema();
        // 200000 / 800000 = 25% of the viewport: far above the cutoff.
        let mut big = AnalyzedNode::new("big", NodeType::Rectangle, "div");
        big.parent_id = Some("root".to_owned());
        big.absolute_layout = LayoutRect::new(0.0, 0.0, 500.0, 400.0);
        let mut small = AnalyzedNode::new("small", NodeType::Rectangle, "div");
        small.parent_id = Some("root".to_owned());
        small.absolute_layout = LayoutRect::new(0.0, 500.0, 50.0, 40.0);
        schema.root.children.push(big);
        schema.root.children.push(small);

        let context = AiContext {
            palette: Some(vec![Rgba::opaque(0.9, 0.9, 0.9)]),
            ..AiContext::default()
        };
        let enhanced = enhance(schema, &context);
        assert!(enhanced.root.children[0].fills.is_empty());
        assert_eq!(enhanced.root.children[1].fills.len(), 1);
    }

    #[test]
    fn font_sizes_snap_and_keep_original() {
        let mut schema = base_schema();
        let mut text = AnalyzedNode::new("t", NodeType::Text, "#text");
        text.parent_id = Some("root".to_owned());
        text.absolute_layout = LayoutRect::new(0.0, 0.0, 100.0, 20.0);
        text.text_style = Some(scene::TextStyle {
            font_family: "Inter".to_owned(),
            font_fallbacks: vec![],
            font_weight: 400,
            font_style: scene::node::FontStyle::Normal,
            font_size: 17.3,
            line_height: 22.0,
            letter_spacing: 0.0,
            text_decoration: scene::node::TextDecoration::None,
            text_align: scene::node::TextAlign::Left,
            text_case: scene::node::TextCase::Original,
            text_auto_resize: scene::node::TextAutoResize::None,
        });
        schema.root.children.push(text);

        let context = AiContext {
            typography: Some(TypeScale {
                sizes: vec![12.0, 16.0, 24.0],
            }),
            ..AiContext::default()
        };
        let enhanced = enhance(schema, &context);
        let node = &enhanced.root.children[0];
        assert_eq!(node.text_style.as_ref().unwrap().font_size, 16.0);
        assert_eq!(node.original_font_size, Some(17.3));
    }

    #[test]
    fn horizontal_rows_suggest_auto_layout() {
        let mut schema = base_schema();
        let mut row = AnalyzedNode::new("row", NodeType::Frame, "div");
        row.parent_id = Some("root".to_owned());
        row.absolute_layout = LayoutRect::new(0.0, 0.0, 300.0, 50.0);
        for index in 0..3 {
            let mut item = AnalyzedNode::new(format!("i{index}"), NodeType::Rectangle, "div");
            item.parent_id = Some("row".to_owned());
            item.absolute_layout = LayoutRect::new(f64::from(index) * 100.0, 10.0, 80.0, 30.0);
            row.children.push(item);
        }
        schema.root.children.push(row);

        let enhanced = enhance(schema, &AiContext::default());
        let suggestion = enhanced.root.children[0]
            .suggested_auto_layout
            .as_ref()
            .unwrap();
        assert_eq!(suggestion.mode, scene::node::AutoLayoutMode::Horizontal);
    }

    #[test]
    fn enhancement_is_idempotent_and_structure_preserving() {
        let mut schema = base_schema();
        schema
            .root
            .children
            .push(image_node("hero", LayoutRect::new(0.0, 0.0, 400.0, 200.0)));
        let mut small = AnalyzedNode::new("chip", NodeType::Rectangle, "span");
        small.parent_id = Some("root".to_owned());
        small.absolute_layout = LayoutRect::new(10.0, 300.0, 40.0, 20.0);
        schema.root.children.push(small);

        let context = AiContext {
            ocr: Some(vec![OcrWord {
                text: "hero".to_owned(),
                rect: LayoutRect::new(10.0, 10.0, 50.0, 20.0),
            }]),
            ml_components: Some(vec![DetectedComponent {
                label: "CARD".to_owned(),
                rect: LayoutRect::new(0.0, 0.0, 400.0, 200.0),
                confidence: 0.9,
            }]),
            palette: Some(vec![Rgba::opaque(0.2, 0.2, 0.2)]),
            typography: Some(TypeScale {
                sizes: vec![12.0, 16.0],
            }),
            spacing_scale: Some(vec![4.0, 8.0]),
        };

        let once = enhance(schema.clone(), &context);
        let twice = enhance(once.clone(), &context);
        assert_eq!(once, twice);
        assert_eq!(once.root.id, schema.root.id);
        assert_eq!(once.node_count(), schema.node_count());
        assert!(scene::validate(&once).is_empty());
    }
}
