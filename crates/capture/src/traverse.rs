//! DOM traverser: depth-first walk of the rendered element tree,
//! producing one `AnalyzedNode` per visible element plus the pending
//! asset and rasterization work the async phases complete.

use crate::config::{CancelFlag, CaptureConfig};
use crate::host::{ChildEntry, FrameContent, PageHost, PseudoKind};
use crate::resolve::{self, ResolvedVisual};
use scene::node::{NodeType, RasterReason};
use scene::{AnalyzedNode, ImageFit, LayoutRect, Paint, TextStyle};
use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Where an asset's bytes come from.
#[derive(Debug, Clone)]
pub enum AssetSource<Element> {
    Url(String),
    DataUrl(String),
    /// Draw the element's current frame (canvas, poster-less video).
    ElementFrame(Element),
}

/// What to do with an acquired asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetPurpose {
    /// Set `image_hash`/`intrinsic_size` on the IMAGE node itself.
    NodeImage,
    /// Append an IMAGE paint to the node's fills.
    BackgroundLayer,
}

/// One pending asset acquisition.
#[derive(Debug, Clone)]
pub struct AssetRequest<Element> {
    pub node_id: String,
    pub source: AssetSource<Element>,
    pub purpose: AssetPurpose,
    pub fit: ImageFit,
    /// Natural size already known from the host (images report it
    /// without a fetch).
    pub known_natural_size: Option<(f64, f64)>,
    /// Layer position within the node, preserving paint order when
    /// fetches complete out of order.
    pub ordinal: usize,
}

/// One pending element rasterization.
#[derive(Debug, Clone)]
pub struct RasterRequest<Element> {
    pub node_id: String,
    pub element: Element,
    pub reason: RasterReason,
}

/// Everything the traversal produced.
#[derive(Debug)]
pub struct Traversal<Element> {
    /// Root of the analyzed tree; `None` for a page with no rendered
    /// elements.
    pub root: Option<AnalyzedNode>,
    pub assets: Vec<AssetRequest<Element>>,
    pub rasters: Vec<RasterRequest<Element>>,
    /// Interactive elements eligible for hover/focus variants.
    pub interactive: Vec<(String, Element)>,
    /// Every text style observed, for the font registry.
    pub text_styles: Vec<TextStyle>,
}

/// Tags whose subtrees never render.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "meta", "link", "head", "title", "noscript", "template", "base",
];

/// Walk the page and build the analyzed tree.
///
/// # Errors
/// `Canceled` when the cancel flag trips mid-walk.
pub fn traverse<H: PageHost>(
    host: &H,
    config: &CaptureConfig,
    cancel: &CancelFlag,
) -> scene::Result<Traversal<H::Element>> {
    let mut context = WalkContext {
        host,
        config,
        cancel,
        visited: HashSet::new(),
        assets: Vec::new(),
        rasters: Vec::new(),
        interactive: Vec::new(),
        text_styles: Vec::new(),
    };

    let root = match host.root_element() {
        Some(element) => context.visit_element(&element, None, &[], 0, 0)?,
        None => None,
    };

    Ok(Traversal {
        root,
        assets: context.assets,
        rasters: context.rasters,
        interactive: context.interactive,
        text_styles: context.text_styles,
    })
}

struct WalkContext<'walk, H: PageHost> {
    host: &'walk H,
    config: &'walk CaptureConfig,
    cancel: &'walk CancelFlag,
    visited: HashSet<H::Element>,
    assets: Vec<AssetRequest<H::Element>>,
    rasters: Vec<RasterRequest<H::Element>>,
    interactive: Vec<(String, H::Element)>,
    text_styles: Vec<TextStyle>,
}

impl<H: PageHost> WalkContext<'_, H> {
    /// Visit one element; returns its analyzed subtree, or `None` when
    /// the element (and therefore its subtree) is skipped.
    fn visit_element(
        &mut self,
        element: &H::Element,
        parent_id: Option<&str>,
        ancestor_path: &[usize],
        sibling_index: usize,
        frame_depth: usize,
    ) -> scene::Result<Option<AnalyzedNode>> {
        self.cancel.check()?;

        // Defense against pathological shadow-root back-references:
        // abort the repeat, not the capture.
        if !self.visited.insert(element.clone()) {
            log::warn!("traversal revisited an element; skipping the repeat");
            return Ok(None);
        }

        let tag = self.host.tag_name(element).to_ascii_lowercase();
        if SKIPPED_TAGS.contains(&tag.as_str()) {
            return Ok(None);
        }
        if self.host.computed_style(element, "display").trim() == "none" {
            return Ok(None);
        }
        if self.host.computed_style(element, "visibility").trim() == "hidden" {
            return Ok(None);
        }
        let rect = self.host.bounding_rect(element);
        let is_root = parent_id.is_none();
        if rect.is_empty() && !is_root {
            return Ok(None);
        }

        let node_id = derive_node_id(
            &tag,
            ancestor_path,
            &self
                .host
                .attribute(element, "class")
                .unwrap_or_default(),
            sibling_index,
        );

        let node_type = classify_element(&tag);
        let resolved = resolve::resolve_element(self.host, element, &rect, node_type == NodeType::Image);

        let mut node = AnalyzedNode::new(node_id.clone(), node_type, tag.clone());
        node.parent_id = parent_id.map(str::to_owned);
        node.name = derive_name(self.host, element, &tag);
        node.absolute_layout = rect;
        apply_resolved(&mut node, &resolved);

        if let Some(reason) = resolved.raster_reason {
            self.rasters.push(RasterRequest {
                node_id: node_id.clone(),
                element: element.clone(),
                reason,
            });
        }
        for (ordinal, request) in resolved.background_images.iter().enumerate() {
            self.assets.push(AssetRequest {
                node_id: node_id.clone(),
                source: AssetSource::Url(request.url.clone()),
                purpose: AssetPurpose::BackgroundLayer,
                fit: request.fit,
                known_natural_size: None,
                ordinal,
            });
        }
        // Asymmetric borders: synthetic edge rectangles painted above
        // the element's own fills, below its children.
        let mut path = ancestor_path.to_vec();
        path.push(sibling_index);
        for edge in &resolved.border_edges {
            let mut edge_node = AnalyzedNode::new(
                format!("{node_id}-edge-{}", edge.side),
                NodeType::Rectangle,
                tag.clone(),
            );
            edge_node.parent_id = Some(node_id.clone());
            edge_node.name = format!("{} border {}", node.name, edge.side);
            edge_node.absolute_layout = edge.rect;
            edge_node.fills = vec![Paint::solid(edge.color)];
            node.children.push(edge_node);
        }

        self.collect_replaced_content(element, &tag, &node_id, &rect, &mut node);
        self.collect_interactive(element, &tag, &node_id);
        self.visit_pseudo(element, PseudoKind::Before, &node_id, &rect, &mut node);

        self.visit_children(element, &node_id, &path, frame_depth, &mut node)?;

        self.visit_pseudo(element, PseudoKind::After, &node_id, &rect, &mut node);

        Ok(Some(node))
    }

    fn visit_children(
        &mut self,
        element: &H::Element,
        node_id: &str,
        path: &[usize],
        frame_depth: usize,
        node: &mut AnalyzedNode,
    ) -> scene::Result<()> {
        // Frames first: same-origin content replaces children,
        // cross-origin content can only be rasterized.
        match self.host.frame_content(element) {
            FrameContent::SameOrigin(content_root) => {
                if frame_depth < self.config.max_frame_depth {
                    let child = self.visit_element(
                        &content_root,
                        Some(node_id),
                        path,
                        0,
                        frame_depth + 1,
                    )?;
                    if let Some(child) = child {
                        node.children.push(child);
                    }
                } else {
                    log::debug!("iframe depth limit reached under {node_id}");
                }
                return Ok(());
            }
            FrameContent::CrossOrigin => {
                if !node.absolute_layout.is_empty() {
                    node.node_type = NodeType::Image;
                    self.rasters.push(RasterRequest {
                        node_id: node_id.to_owned(),
                        element: element.clone(),
                        reason: RasterReason::UnsupportedVisual,
                    });
                }
                return Ok(());
            }
            FrameContent::None => {}
        }

        let entries = self
            .host
            .shadow_children(element)
            .unwrap_or_else(|| self.host.children(element));
        let mut element_index = 0usize;
        for entry in entries {
            match entry {
                ChildEntry::Element(child) => {
                    let analyzed =
                        self.visit_element(&child, Some(node_id), path, element_index, frame_depth)?;
                    if let Some(analyzed) = analyzed {
                        node.children.push(analyzed);
                    }
                    element_index += 1;
                }
                ChildEntry::Text(text) => {
                    let collapsed = collapse_whitespace(&text);
                    if collapsed.is_empty() {
                        continue;
                    }
                    let text_node = self.make_text_node(
                        element,
                        node_id,
                        &node.absolute_layout,
                        node.children.len(),
                        collapsed,
                    );
                    node.children.push(text_node);
                }
            }
        }
        Ok(())
    }

    fn make_text_node(
        &mut self,
        element: &H::Element,
        parent_id: &str,
        parent_rect: &LayoutRect,
        ordinal: usize,
        characters: String,
    ) -> AnalyzedNode {
        let read = |property: &str| self.host.computed_style(element, property);
        let text_style = resolve::text::resolve_text_style(&read);
        self.text_styles.push(text_style.clone());

        let mut node = AnalyzedNode::new(
            format!("{parent_id}-text-{ordinal}"),
            NodeType::Text,
            "#text",
        );
        node.parent_id = Some(parent_id.to_owned());
        node.name = truncate_name(&characters);
        node.absolute_layout = *parent_rect;
        if let Some(color) = resolve::color::parse_css_color(&read("color")) {
            node.fills = vec![Paint::solid(color)];
        }
        node.characters = Some(characters);
        node.text_style = Some(text_style);
        node
    }

    /// Replaced elements: images, canvas frames, video posters, SVG.
    fn collect_replaced_content(
        &mut self,
        element: &H::Element,
        tag: &str,
        node_id: &str,
        rect: &LayoutRect,
        node: &mut AnalyzedNode,
    ) {
        match tag {
            "img" => {
                let natural = self.host.natural_size(element);
                node.image_fit = Some(resolve::background::object_fit_to_image_fit(
                    &self.host.computed_style(element, "object-fit"),
                ));
                let source = self.host.attribute(element, "src").map_or_else(
                    || AssetSource::ElementFrame(element.clone()),
                    AssetSource::Url,
                );
                self.assets.push(AssetRequest {
                    node_id: node_id.to_owned(),
                    source,
                    purpose: AssetPurpose::NodeImage,
                    fit: node.image_fit.unwrap_or(ImageFit::Fill),
                    known_natural_size: natural,
                    ordinal: 0,
                });
            }
            "canvas" => {
                node.image_fit = Some(ImageFit::Fill);
                let source = self.host.element_frame_data_url(element).map_or_else(
                    || AssetSource::ElementFrame(element.clone()),
                    AssetSource::DataUrl,
                );
                self.assets.push(AssetRequest {
                    node_id: node_id.to_owned(),
                    source,
                    purpose: AssetPurpose::NodeImage,
                    fit: ImageFit::Fill,
                    known_natural_size: self.host.natural_size(element),
                    ordinal: 0,
                });
            }
            "video" => {
                node.image_fit = Some(resolve::background::object_fit_to_image_fit(
                    &self.host.computed_style(element, "object-fit"),
                ));
                let source = self.host.attribute(element, "poster").map_or_else(
                    || {
                        self.host.element_frame_data_url(element).map_or_else(
                            || AssetSource::ElementFrame(element.clone()),
                            AssetSource::DataUrl,
                        )
                    },
                    AssetSource::Url,
                );
                self.assets.push(AssetRequest {
                    node_id: node_id.to_owned(),
                    source,
                    purpose: AssetPurpose::NodeImage,
                    fit: node.image_fit.unwrap_or(ImageFit::Fill),
                    known_natural_size: self.host.natural_size(element),
                    ordinal: 0,
                });
            }
            "svg" => {
                // Policy: inline SVG rasterizes at display size.
                if !rect.is_empty() {
                    self.rasters.push(RasterRequest {
                        node_id: node_id.to_owned(),
                        element: element.clone(),
                        reason: RasterReason::UnsupportedVisual,
                    });
                }
            }
            _ => {}
        }
    }

    fn collect_interactive(&mut self, element: &H::Element, tag: &str, node_id: &str) {
        let interactive_tag = matches!(tag, "a" | "button" | "input" | "select" | "textarea");
        let pointer_cursor = self.host.computed_style(element, "cursor").trim() == "pointer";
        if interactive_tag || pointer_cursor {
            self.interactive.push((node_id.to_owned(), element.clone()));
        }
    }

    /// `::before`/`::after` with non-empty resolved content become
    /// PSEUDO children.
    fn visit_pseudo(
        &mut self,
        element: &H::Element,
        pseudo: PseudoKind,
        parent_id: &str,
        parent_rect: &LayoutRect,
        node: &mut AnalyzedNode,
    ) {
        let Some(content) = self.host.pseudo_style(element, pseudo, "content") else {
            return;
        };
        let Some(content) = resolve_content(&content) else {
            return;
        };

        let suffix = match pseudo {
            PseudoKind::Before => "before",
            PseudoKind::After => "after",
        };
        let pseudo_id = format!("{parent_id}-{suffix}");
        let read = |property: &str| {
            self.host
                .pseudo_style(element, pseudo, property)
                .unwrap_or_default()
        };
        let rect = pseudo_rect(&read, parent_rect);
        let resolved = resolve::resolve_from(&read, &rect, false);

        let mut pseudo_node =
            AnalyzedNode::new(pseudo_id.clone(), NodeType::Pseudo, format!("::{suffix}"));
        pseudo_node.parent_id = Some(parent_id.to_owned());
        pseudo_node.name = format!("{}::{suffix}", node.name);
        pseudo_node.absolute_layout = rect;
        apply_resolved(&mut pseudo_node, &resolved);

        match content {
            PseudoContent::Text(text) => {
                let mut text_node = AnalyzedNode::new(
                    format!("{pseudo_id}-text"),
                    NodeType::Text,
                    "#text",
                );
                text_node.parent_id = Some(pseudo_id.clone());
                text_node.name = truncate_name(&text);
                text_node.absolute_layout = rect;
                let style = resolve::text::resolve_text_style(&read);
                self.text_styles.push(style.clone());
                if let Some(color) = resolve::color::parse_css_color(&read("color")) {
                    text_node.fills = vec![Paint::solid(color)];
                }
                text_node.characters = Some(text);
                text_node.text_style = Some(style);
                pseudo_node.children.push(text_node);
            }
            PseudoContent::Image(url) => {
                let mut image_node = AnalyzedNode::new(
                    format!("{pseudo_id}-image"),
                    NodeType::Image,
                    "#pseudo-image",
                );
                image_node.parent_id = Some(pseudo_id.clone());
                image_node.name = format!("{}::{suffix} image", node.name);
                image_node.absolute_layout = rect;
                image_node.image_fit = Some(ImageFit::Crop);
                self.assets.push(AssetRequest {
                    node_id: image_node.id.clone(),
                    source: AssetSource::Url(url),
                    purpose: AssetPurpose::NodeImage,
                    fit: ImageFit::Crop,
                    known_natural_size: None,
                    ordinal: 0,
                });
                pseudo_node.children.push(image_node);
            }
        }

        node.children.push(pseudo_node);
    }
}

/// Copy resolver output onto a node.
fn apply_resolved(node: &mut AnalyzedNode, resolved: &ResolvedVisual) {
    node.fills = resolved.fills.clone();
    node.strokes = resolved.strokes.clone();
    node.stroke_weight = resolved.stroke_weight;
    node.stroke_align = resolved.stroke_align;
    node.stroke_side_weights = resolved.stroke_side_weights;
    node.effects = resolved.effects.clone();
    node.corner_radius = resolved.corner_radius;
    node.clips_content = resolved.clips_content;
    node.opacity = resolved.opacity;
    node.blend_mode = resolved.blend_mode;
    node.isolation = resolved.isolation;
    node.absolute_transform = resolved.absolute_transform;
    node.layout_context = resolved.layout_context.clone();
    node.css_filter = resolved.css_filter.clone();
    node.mix_blend_mode = resolved.mix_blend_mode.clone();
    if let Some(reason) = resolved.raster_reason {
        node.rasterize = Some(scene::Rasterize {
            reason,
            data_url: None,
        });
    }
}

/// Stable node id: hash of tag, ancestor index path, class
/// fingerprint, and the tag-local sibling sequence. The same tree
/// yields the same ids.
fn derive_node_id(tag: &str, ancestor_path: &[usize], classes: &str, sequence: usize) -> String {
    let mut hasher = DefaultHasher::new();
    tag.hash(&mut hasher);
    ancestor_path.hash(&mut hasher);
    classes.hash(&mut hasher);
    sequence.hash(&mut hasher);
    format!("{tag}-{:012x}", hasher.finish() & 0xffff_ffff_ffff)
}

fn classify_element(tag: &str) -> NodeType {
    match tag {
        "img" | "canvas" | "video" | "svg" | "picture" => NodeType::Image,
        _ => NodeType::Frame,
    }
}

fn derive_name<H: PageHost>(host: &H, element: &H::Element, tag: &str) -> String {
    if let Some(id) = host.attribute(element, "id") {
        return format!("{tag}#{id}");
    }
    if let Some(classes) = host.attribute(element, "class")
        && let Some(first) = classes.split_whitespace().next()
    {
        return format!("{tag}.{first}");
    }
    tag.to_owned()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_name(text: &str) -> String {
    const LIMIT: usize = 40;
    if text.chars().count() <= LIMIT {
        text.to_owned()
    } else {
        let truncated: String = text.chars().take(LIMIT).collect();
        format!("{truncated}…")
    }
}

/// Resolved pseudo `content` values.
enum PseudoContent {
    Text(String),
    Image(String),
}

/// Interpret a computed `content` value: quoted strings render as
/// text, `url()` renders as an image, everything else is empty.
fn resolve_content(value: &str) -> Option<PseudoContent> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "none" || trimmed == "normal" || trimmed == "\"\"" {
        return None;
    }
    if let Some(url) = resolve::background::strip_url(trimmed) {
        return Some(PseudoContent::Image(url));
    }
    let unquoted = trimmed
        .trim_matches(|character| character == '"' || character == '\'')
        .to_owned();
    if unquoted.is_empty() {
        None
    } else {
        Some(PseudoContent::Text(unquoted))
    }
}

/// Pseudo-element box: explicit width/height when the computed style
/// carries them, otherwise the host element's rect.
fn pseudo_rect(read: &impl Fn(&str) -> String, parent_rect: &LayoutRect) -> LayoutRect {
    let width = resolve::shadow::parse_px(&read("width"));
    let height = resolve::shadow::parse_px(&read("height"));
    match (width, height) {
        (Some(width), Some(height)) => {
            LayoutRect::new(parent_rect.left, parent_rect.top, width, height)
        }
        _ => *parent_rect,
    }
}
