//! An in-memory design tool. Every host call is recorded onto plain
//! node records, so tests and the CLI can inspect exactly what an
//! import produced without a real plugin runtime.

use crate::host::{
    DesignHost, HostPaint, RelativeTransform, SharedStyleKind, TargetKind,
};
use scene::node::{AutoLayout, TextStyle};
use scene::{CornerRadius, Effect, Error, Result, StrokeAlign};
use serde_json::json;
use std::collections::HashSet;

/// One recorded node. `usize` ids double as node references and
/// image handles.
#[derive(Debug, Clone)]
pub struct RecordedNode {
    pub id: usize,
    pub kind: RecordedKind,
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub relative_transform: Option<RelativeTransform>,
    pub fills: Vec<HostPaint<usize>>,
    pub strokes: Vec<HostPaint<usize>>,
    pub stroke_weight: f64,
    pub stroke_align: StrokeAlign,
    pub effects: Vec<Effect>,
    pub corner_radius: Option<CornerRadius>,
    pub blend_mode: scene::BlendMode,
    pub opacity: f64,
    pub clips_content: bool,
    pub characters: Option<String>,
    pub font_family: Option<String>,
    pub text_style: Option<TextStyle>,
    pub auto_layout: Option<AutoLayout>,
    pub bound_styles: Vec<(SharedStyleKind, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedKind {
    Page,
    Frame,
    Rectangle,
    Text,
    Vector,
}

impl From<TargetKind> for RecordedKind {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Frame => Self::Frame,
            TargetKind::Rectangle => Self::Rectangle,
            TargetKind::Text => Self::Text,
            TargetKind::Vector => Self::Vector,
        }
    }
}

/// The recording design tool.
pub struct RecordingHost {
    pub nodes: Vec<RecordedNode>,
    /// Uploaded image byte blobs; the index is the handle.
    pub images: Vec<Vec<u8>>,
    pub shared_styles: Vec<(SharedStyleKind, String)>,
    loaded_fonts: HashSet<(String, String)>,
    available_families: HashSet<String>,
    fail_image_uploads: bool,
    fail_named_nodes: HashSet<String>,
}

/// Families every recording host has, mirroring a design tool's
/// built-in library. "Inter" is the guaranteed final fallback.
const BUILTIN_FAMILIES: &[&str] = &[
    "Inter",
    "Roboto",
    "Arial",
    "Helvetica",
    "Georgia",
    "Times New Roman",
    "sans-serif",
    "serif",
    "monospace",
];

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            images: Vec::new(),
            shared_styles: Vec::new(),
            loaded_fonts: HashSet::new(),
            available_families: BUILTIN_FAMILIES
                .iter()
                .map(|family| (*family).to_owned())
                .collect(),
            fail_image_uploads: false,
            fail_named_nodes: HashSet::new(),
        }
    }

    /// Make an extra family loadable.
    pub fn install_family(&mut self, family: &str) {
        self.available_families.insert(family.to_owned());
    }

    pub fn fail_image_uploads(&mut self, fail: bool) {
        self.fail_image_uploads = fail;
    }

    /// Make node creation fail for a given name, for per-node error
    /// boundary tests.
    pub fn fail_node_named(&mut self, name: &str) {
        self.fail_named_nodes.insert(name.to_owned());
    }

    #[must_use]
    pub fn node(&self, id: usize) -> Option<&RecordedNode> {
        self.nodes.get(id)
    }

    /// First node whose name matches exactly.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&RecordedNode> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Children of a node in attachment order.
    #[must_use]
    pub fn children_of(&self, id: usize) -> Vec<&RecordedNode> {
        self.nodes
            .get(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child| self.nodes.get(*child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fonts that were actually loaded, as `(family, style)` pairs.
    #[must_use]
    pub fn loaded_fonts(&self) -> Vec<(String, String)> {
        let mut fonts: Vec<(String, String)> = self.loaded_fonts.iter().cloned().collect();
        fonts.sort();
        fonts
    }

    /// Absolute position of a node (walking parents).
    #[must_use]
    pub fn absolute_position(&self, id: usize) -> (f64, f64) {
        let mut x = 0.0;
        let mut y = 0.0;
        let mut current = self.nodes.get(id);
        while let Some(node) = current {
            x += node.x;
            y += node.y;
            current = node.parent.and_then(|parent| self.nodes.get(parent));
        }
        (x, y)
    }

    /// Deterministic JSON dump of the document for snapshots.
    #[must_use]
    pub fn document_json(&self) -> serde_json::Value {
        let pages: Vec<serde_json::Value> = self
            .nodes
            .iter()
            .filter(|node| node.kind == RecordedKind::Page)
            .map(|page| self.node_json(page))
            .collect();
        json!({ "pages": pages })
    }

    fn node_json(&self, node: &RecordedNode) -> serde_json::Value {
        let children: Vec<serde_json::Value> = node
            .children
            .iter()
            .filter_map(|child| self.nodes.get(*child))
            .map(|child| self.node_json(child))
            .collect();
        json!({
            "name": node.name,
            "kind": format!("{:?}", node.kind),
            "x": node.x,
            "y": node.y,
            "width": node.width,
            "height": node.height,
            "fills": node.fills.len(),
            "effects": node.effects.len(),
            "characters": node.characters,
            "children": children,
        })
    }

    fn push_node(&mut self, kind: RecordedKind, name: &str) -> usize {
        let id = self.nodes.len();
        self.nodes.push(RecordedNode {
            id,
            kind,
            name: name.to_owned(),
            parent: None,
            children: Vec::new(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            relative_transform: None,
            fills: Vec::new(),
            strokes: Vec::new(),
            stroke_weight: 0.0,
            stroke_align: StrokeAlign::Inside,
            effects: Vec::new(),
            corner_radius: None,
            blend_mode: scene::BlendMode::Normal,
            opacity: 1.0,
            clips_content: false,
            characters: None,
            font_family: None,
            text_style: None,
            auto_layout: None,
            bound_styles: Vec::new(),
        });
        id
    }

    fn node_mut(&mut self, id: usize) -> Result<&mut RecordedNode> {
        self.nodes.get_mut(id).ok_or_else(|| Error::NodeBuildFailed {
            node_id: id.to_string(),
            cause: "unknown node reference".to_owned(),
        })
    }
}

impl DesignHost for RecordingHost {
    type NodeRef = usize;
    type ImageHandle = usize;

    fn create_page(&mut self, name: &str) -> Result<usize> {
        Ok(self.push_node(RecordedKind::Page, name))
    }

    fn create_node(&mut self, kind: TargetKind, name: &str) -> Result<usize> {
        if self.fail_named_nodes.contains(name) {
            return Err(Error::NodeBuildFailed {
                node_id: name.to_owned(),
                cause: "injected creation failure".to_owned(),
            });
        }
        Ok(self.push_node(kind.into(), name))
    }

    fn append_child(&mut self, parent: &usize, child: &usize) -> Result<()> {
        let child_id = *child;
        self.node_mut(*parent)?.children.push(child_id);
        self.node_mut(child_id)?.parent = Some(*parent);
        Ok(())
    }

    fn resize(&mut self, node: &usize, width: f64, height: f64) -> Result<()> {
        let record = self.node_mut(*node)?;
        record.width = width;
        record.height = height;
        Ok(())
    }

    fn set_relative_transform(
        &mut self,
        node: &usize,
        transform: RelativeTransform,
    ) -> Result<()> {
        let record = self.node_mut(*node)?;
        record.relative_transform = Some(transform);
        // The transform carries the translation column.
        record.x = transform[0][2];
        record.y = transform[1][2];
        Ok(())
    }

    fn set_position(&mut self, node: &usize, x: f64, y: f64) -> Result<()> {
        let record = self.node_mut(*node)?;
        record.x = x;
        record.y = y;
        Ok(())
    }

    fn set_fills(&mut self, node: &usize, fills: Vec<HostPaint<usize>>) -> Result<()> {
        self.node_mut(*node)?.fills = fills;
        Ok(())
    }

    fn set_strokes(
        &mut self,
        node: &usize,
        strokes: Vec<HostPaint<usize>>,
        weight: f64,
        align: StrokeAlign,
    ) -> Result<()> {
        let record = self.node_mut(*node)?;
        record.strokes = strokes;
        record.stroke_weight = weight;
        record.stroke_align = align;
        Ok(())
    }

    fn set_effects(&mut self, node: &usize, effects: Vec<Effect>) -> Result<()> {
        self.node_mut(*node)?.effects = effects;
        Ok(())
    }

    fn set_corner_radius(&mut self, node: &usize, radius: CornerRadius) -> Result<()> {
        self.node_mut(*node)?.corner_radius = Some(radius);
        Ok(())
    }

    fn set_blend_mode(&mut self, node: &usize, blend_mode: scene::BlendMode) -> Result<()> {
        self.node_mut(*node)?.blend_mode = blend_mode;
        Ok(())
    }

    fn set_opacity(&mut self, node: &usize, opacity: f64) -> Result<()> {
        self.node_mut(*node)?.opacity = opacity;
        Ok(())
    }

    fn set_clips_content(&mut self, node: &usize, clips: bool) -> Result<()> {
        self.node_mut(*node)?.clips_content = clips;
        Ok(())
    }

    async fn create_image(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.fail_image_uploads {
            return Err(Error::AssetFetchFailed {
                url: "upload".to_owned(),
                cause: "injected upload failure".to_owned(),
            });
        }
        self.images.push(bytes.to_vec());
        Ok(self.images.len() - 1)
    }

    async fn load_font(&mut self, family: &str, style: &str) -> Result<()> {
        if self.available_families.contains(family) {
            self.loaded_fonts
                .insert((family.to_owned(), style.to_owned()));
            Ok(())
        } else {
            Err(Error::FontLoadFailed {
                family: family.to_owned(),
                style: style.to_owned(),
            })
        }
    }

    fn guaranteed_family(&self) -> String {
        "Inter".to_owned()
    }

    fn set_text(
        &mut self,
        node: &usize,
        characters: &str,
        family: &str,
        style: &TextStyle,
    ) -> Result<()> {
        let loaded = self
            .loaded_fonts
            .iter()
            .any(|(loaded_family, _)| loaded_family == family);
        if !loaded {
            return Err(Error::FontLoadFailed {
                family: family.to_owned(),
                style: "unloaded".to_owned(),
            });
        }
        let record = self.node_mut(*node)?;
        record.characters = Some(characters.to_owned());
        record.font_family = Some(family.to_owned());
        record.text_style = Some(style.clone());
        Ok(())
    }

    fn set_auto_layout(&mut self, node: &usize, auto_layout: &AutoLayout) -> Result<()> {
        self.node_mut(*node)?.auto_layout = Some(auto_layout.clone());
        Ok(())
    }

    fn create_shared_style(&mut self, kind: SharedStyleKind, name: &str) -> Result<String> {
        self.shared_styles.push((kind, name.to_owned()));
        Ok(format!("style-{}", self.shared_styles.len() - 1))
    }

    fn bind_shared_style(
        &mut self,
        node: &usize,
        kind: SharedStyleKind,
        style_id: &str,
    ) -> Result<()> {
        self.node_mut(*node)?
            .bound_styles
            .push((kind, style_id.to_owned()));
        Ok(())
    }
}
