//! In-memory `PageHost` over an arena-backed element tree.
//!
//! Used by unit and integration tests, and by offline captures of
//! pre-resolved page dumps. Styles are stored exactly as a browser
//! would serialize them from `getComputedStyle`, so the resolver sees
//! the same grammar in tests as in production.

use crate::host::{ChildEntry, DocumentInfo, ForcedState, FrameContent, PageHost, PseudoKind};
use indextree::{Arena, NodeId};
use scene::{Error, LayoutRect, Result, ViewportInfo};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// What a fixture element renders as, beyond a plain element box.
#[derive(Debug, Clone, Default)]
enum FixtureKind {
    #[default]
    Element,
    Text(String),
    /// Same-origin frame whose content root is another arena node.
    SameOriginFrame(NodeId),
    CrossOriginFrame,
}

#[derive(Debug, Default)]
struct FixtureNode {
    tag: String,
    kind: FixtureKind,
    attrs: SmallVec<(String, String), 4>,
    styles: HashMap<String, String>,
    before_styles: Option<HashMap<String, String>>,
    after_styles: Option<HashMap<String, String>>,
    hover_styles: HashMap<String, String>,
    focus_styles: HashMap<String, String>,
    rect: LayoutRect,
    natural_size: Option<(f64, f64)>,
    frame_data_url: Option<String>,
    shadow_host: bool,
}

/// An in-memory rendered page.
pub struct FixturePage {
    arena: Arena<FixtureNode>,
    root: NodeId,
    info: DocumentInfo,
    viewport: Mutex<ViewportInfo>,
    custom_properties: Vec<(String, String)>,
    scroll_offset: Mutex<f64>,
    guard_active: AtomicBool,
    next_style_handle: AtomicU64,
    injected_styles: Mutex<Vec<u64>>,
    quiescent: bool,
    blocked_navigations: Mutex<Vec<String>>,
    screenshots: Mutex<HashMap<NodeId, Vec<u8>>>,
    resources: HashMap<String, (Vec<u8>, String)>,
    fail_screenshots: bool,
    fail_serialization: bool,
}

impl FixturePage {
    /// An empty page with an `html` root element filling the viewport.
    #[must_use]
    pub fn blank(width: f64, height: f64) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(FixtureNode {
            tag: "html".to_owned(),
            rect: LayoutRect::new(0.0, 0.0, width, height),
            ..FixtureNode::default()
        });
        Self {
            arena,
            root,
            info: DocumentInfo {
                url: "https://example.test/".to_owned(),
                title: "Fixture".to_owned(),
                restricted: false,
            },
            viewport: Mutex::new(ViewportInfo {
                width,
                height,
                device_pixel_ratio: 1.0,
                layout_viewport_width: width,
                layout_viewport_height: height,
                scroll_height: height,
            }),
            custom_properties: Vec::new(),
            scroll_offset: Mutex::new(0.0),
            guard_active: AtomicBool::new(false),
            next_style_handle: AtomicU64::new(1),
            injected_styles: Mutex::new(Vec::new()),
            quiescent: true,
            blocked_navigations: Mutex::new(Vec::new()),
            screenshots: Mutex::new(HashMap::new()),
            resources: HashMap::new(),
            fail_screenshots: false,
            fail_serialization: false,
        }
    }

    /// Handle of the root `html` element.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Append an element child with styles given as computed-style
    /// `(property, value)` pairs.
    pub fn add_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        rect: LayoutRect,
        styles: &[(&str, &str)],
    ) -> NodeId {
        let node = self.arena.new_node(FixtureNode {
            tag: tag.to_owned(),
            rect,
            styles: styles
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
            ..FixtureNode::default()
        });
        parent.append(node, &mut self.arena);
        node
    }

    /// Append a text run child.
    pub fn add_text(&mut self, parent: NodeId, text: &str) {
        let node = self.arena.new_node(FixtureNode {
            kind: FixtureKind::Text(text.to_owned()),
            ..FixtureNode::default()
        });
        parent.append(node, &mut self.arena);
    }

    pub fn set_attr(&mut self, element: NodeId, name: &str, value: &str) {
        if let Some(node) = self.arena.get_mut(element) {
            node.get_mut()
                .attrs
                .push((name.to_owned(), value.to_owned()));
        }
    }

    pub fn set_style(&mut self, element: NodeId, property: &str, value: &str) {
        if let Some(node) = self.arena.get_mut(element) {
            node.get_mut()
                .styles
                .insert(property.to_owned(), value.to_owned());
        }
    }

    /// Give the element a generated pseudo-element with the provided
    /// computed styles (must include a non-empty `content` to render).
    pub fn set_pseudo_styles(
        &mut self,
        element: NodeId,
        pseudo: PseudoKind,
        styles: &[(&str, &str)],
    ) {
        let map = styles
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        if let Some(node) = self.arena.get_mut(element) {
            match pseudo {
                PseudoKind::Before => node.get_mut().before_styles = Some(map),
                PseudoKind::After => node.get_mut().after_styles = Some(map),
            }
        }
    }

    /// Override a computed style under a forced interactive state.
    pub fn set_state_style(
        &mut self,
        element: NodeId,
        state: ForcedState,
        property: &str,
        value: &str,
    ) {
        if let Some(node) = self.arena.get_mut(element) {
            let map = match state {
                ForcedState::Hover => &mut node.get_mut().hover_styles,
                ForcedState::Focus => &mut node.get_mut().focus_styles,
            };
            map.insert(property.to_owned(), value.to_owned());
        }
    }

    pub fn set_natural_size(&mut self, element: NodeId, width: f64, height: f64) {
        if let Some(node) = self.arena.get_mut(element) {
            node.get_mut().natural_size = Some((width, height));
        }
    }

    /// Mark an element as a `<canvas>`/`<video>` frame source.
    pub fn set_frame_data_url(&mut self, element: NodeId, data_url: &str) {
        if let Some(node) = self.arena.get_mut(element) {
            node.get_mut().frame_data_url = Some(data_url.to_owned());
        }
    }

    /// Turn an element into a same-origin iframe with a fresh content
    /// document root, returned for population.
    pub fn set_same_origin_frame(&mut self, element: NodeId, content_rect: LayoutRect) -> NodeId {
        let content_root = self.arena.new_node(FixtureNode {
            tag: "html".to_owned(),
            rect: content_rect,
            ..FixtureNode::default()
        });
        if let Some(node) = self.arena.get_mut(element) {
            node.get_mut().kind = FixtureKind::SameOriginFrame(content_root);
        }
        content_root
    }

    pub fn set_cross_origin_frame(&mut self, element: NodeId) {
        if let Some(node) = self.arena.get_mut(element) {
            node.get_mut().kind = FixtureKind::CrossOriginFrame;
        }
    }

    /// Mark the element as hosting an open shadow root; children are
    /// then treated as shadow children.
    pub fn set_shadow_host(&mut self, element: NodeId) {
        if let Some(node) = self.arena.get_mut(element) {
            node.get_mut().shadow_host = true;
        }
    }

    pub fn set_restricted(&mut self, restricted: bool) {
        self.info.restricted = restricted;
    }

    pub fn set_url(&mut self, url: &str) {
        self.info.url = url.to_owned();
    }

    pub fn set_title(&mut self, title: &str) {
        self.info.title = title.to_owned();
    }

    pub fn set_scroll_height(&mut self, scroll_height: f64) {
        if let Ok(mut viewport) = self.viewport.lock() {
            viewport.scroll_height = scroll_height;
        }
    }

    pub fn set_device_pixel_ratio(&mut self, ratio: f64) {
        if let Ok(mut viewport) = self.viewport.lock() {
            viewport.device_pixel_ratio = ratio;
        }
    }

    pub fn set_quiescent(&mut self, quiescent: bool) {
        self.quiescent = quiescent;
    }

    pub fn set_custom_properties(&mut self, properties: &[(&str, &str)]) {
        self.custom_properties = properties
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
    }

    /// Pre-seed the screenshot for an element instead of the
    /// synthesized default.
    pub fn set_screenshot(&mut self, element: NodeId, png: Vec<u8>) {
        if let Ok(mut map) = self.screenshots.lock() {
            map.insert(element, png);
        }
    }

    pub fn fail_screenshots(&mut self, fail: bool) {
        self.fail_screenshots = fail;
    }

    pub fn fail_serialization(&mut self, fail: bool) {
        self.fail_serialization = fail;
    }

    /// Register a fetchable resource.
    pub fn add_resource(&mut self, url: &str, bytes: Vec<u8>, mime: &str) {
        self.resources
            .insert(url.to_owned(), (bytes, mime.to_owned()));
    }

    #[must_use]
    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset.lock().map(|guard| *guard).unwrap_or(0.0)
    }

    #[must_use]
    pub fn navigation_guard_active(&self) -> bool {
        self.guard_active.load(Ordering::Relaxed)
    }

    /// Simulate a page script assigning `location.href`. With the
    /// guard active the assignment is rewritten to a
    /// `history.replaceState` equivalent and the document URL is
    /// preserved; returns whether the navigation was swallowed.
    pub fn attempt_navigation(&self, target: &str) -> bool {
        if self.navigation_guard_active() {
            if let Ok(mut blocked) = self.blocked_navigations.lock() {
                blocked.push(target.to_owned());
            }
            true
        } else {
            false
        }
    }

    /// Navigation attempts swallowed by the guard so far.
    #[must_use]
    pub fn blocked_navigations(&self) -> Vec<String> {
        self.blocked_navigations
            .lock()
            .map(|blocked| blocked.clone())
            .unwrap_or_default()
    }

    fn node(&self, element: NodeId) -> Option<&FixtureNode> {
        self.arena.get(element).map(indextree::Node::get)
    }

    fn child_entries(&self, element: NodeId) -> Vec<ChildEntry<NodeId>> {
        element
            .children(&self.arena)
            .filter_map(|child| {
                self.node(child).map(|node| match &node.kind {
                    FixtureKind::Text(text) => ChildEntry::Text(text.clone()),
                    _ => ChildEntry::Element(child),
                })
            })
            .collect()
    }
}

/// Encode a solid light-gray PNG of the given pixel dimensions.
/// Used to synthesize screenshot responses of the right size.
#[must_use]
pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let width = width.max(1);
    let height = height.max(1);
    let mut pixels = image::RgbaImage::new(width, height);
    for pixel in pixels.pixels_mut() {
        *pixel = image::Rgba([200, 200, 200, 255]);
    }
    let mut bytes = Vec::new();
    let encode_result = image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png);
    if encode_result.is_err() {
        bytes.clear();
    }
    bytes
}

impl PageHost for FixturePage {
    type Element = NodeId;

    fn document_info(&self) -> DocumentInfo {
        self.info.clone()
    }

    fn viewport(&self) -> ViewportInfo {
        self.viewport
            .lock()
            .map(|viewport| *viewport)
            .unwrap_or_default()
    }

    fn root_element(&self) -> Option<NodeId> {
        Some(self.root)
    }

    fn children(&self, element: &NodeId) -> Vec<ChildEntry<NodeId>> {
        match self.node(*element).map(|node| &node.kind) {
            Some(FixtureKind::SameOriginFrame(_) | FixtureKind::CrossOriginFrame) => Vec::new(),
            _ => self.child_entries(*element),
        }
    }

    fn shadow_children(&self, element: &NodeId) -> Option<Vec<ChildEntry<NodeId>>> {
        self.node(*element)
            .filter(|node| node.shadow_host)
            .map(|_| self.child_entries(*element))
    }

    fn frame_content(&self, element: &NodeId) -> FrameContent<NodeId> {
        match self.node(*element).map(|node| &node.kind) {
            Some(FixtureKind::SameOriginFrame(content_root)) => {
                FrameContent::SameOrigin(*content_root)
            }
            Some(FixtureKind::CrossOriginFrame) => FrameContent::CrossOrigin,
            _ => FrameContent::None,
        }
    }

    fn tag_name(&self, element: &NodeId) -> String {
        self.node(*element)
            .map(|node| node.tag.clone())
            .unwrap_or_default()
    }

    fn attribute(&self, element: &NodeId, name: &str) -> Option<String> {
        self.node(*element).and_then(|node| {
            node.attrs
                .iter()
                .find(|(attr_name, _)| attr_name == name)
                .map(|(_, value)| value.clone())
        })
    }

    fn computed_style(&self, element: &NodeId, property: &str) -> String {
        self.node(*element)
            .and_then(|node| node.styles.get(property).cloned())
            .unwrap_or_default()
    }

    fn pseudo_style(
        &self,
        element: &NodeId,
        pseudo: PseudoKind,
        property: &str,
    ) -> Option<String> {
        self.node(*element).and_then(|node| {
            let map = match pseudo {
                PseudoKind::Before => node.before_styles.as_ref()?,
                PseudoKind::After => node.after_styles.as_ref()?,
            };
            Some(map.get(property).cloned().unwrap_or_default())
        })
    }

    fn forced_state_style(
        &self,
        element: &NodeId,
        state: ForcedState,
        property: &str,
    ) -> Option<String> {
        self.node(*element).map(|node| {
            let map = match state {
                ForcedState::Hover => &node.hover_styles,
                ForcedState::Focus => &node.focus_styles,
            };
            map.get(property)
                .cloned()
                .unwrap_or_else(|| node.styles.get(property).cloned().unwrap_or_default())
        })
    }

    fn bounding_rect(&self, element: &NodeId) -> LayoutRect {
        self.node(*element)
            .map(|node| node.rect)
            .unwrap_or_default()
    }

    fn natural_size(&self, element: &NodeId) -> Option<(f64, f64)> {
        self.node(*element).and_then(|node| node.natural_size)
    }

    fn element_frame_data_url(&self, element: &NodeId) -> Option<String> {
        self.node(*element)
            .and_then(|node| node.frame_data_url.clone())
    }

    fn custom_properties(&self) -> Vec<(String, String)> {
        self.custom_properties.clone()
    }

    async fn set_viewport(&self, width: f64, height: f64, device_scale_factor: f64) {
        if let Ok(mut viewport) = self.viewport.lock() {
            viewport.width = width;
            viewport.height = height;
            viewport.layout_viewport_width = width;
            viewport.layout_viewport_height = height;
            viewport.scroll_height = viewport.scroll_height.max(height);
            viewport.device_pixel_ratio = device_scale_factor;
        }
    }

    async fn scroll_to(&self, offset_y: f64) {
        if let Ok(mut guard) = self.scroll_offset.lock() {
            *guard = offset_y;
        }
    }

    async fn await_network_quiescence(&self, _window: Duration, budget: Duration) -> bool {
        if self.quiescent {
            true
        } else {
            tokio::time::sleep(budget).await;
            false
        }
    }

    fn install_navigation_guard(&self) {
        self.guard_active.store(true, Ordering::Relaxed);
    }

    fn remove_navigation_guard(&self) {
        self.guard_active.store(false, Ordering::Relaxed);
    }

    fn inject_stylesheet(&self, _css: &str) -> u64 {
        let handle = self.next_style_handle.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut styles) = self.injected_styles.lock() {
            styles.push(handle);
        }
        handle
    }

    fn remove_stylesheet(&self, handle: u64) {
        if let Ok(mut styles) = self.injected_styles.lock() {
            styles.retain(|existing| *existing != handle);
        }
    }

    async fn screenshot_element(&self, element: &NodeId) -> Result<Vec<u8>> {
        if self.fail_screenshots {
            return Err(Error::RasterizationFailed {
                node_id: format!("fixture-{element:?}"),
                cause: "screenshots disabled".to_owned(),
            });
        }
        if let Ok(map) = self.screenshots.lock()
            && let Some(bytes) = map.get(element)
        {
            return Ok(bytes.clone());
        }
        let rect = self.bounding_rect(element);
        let ratio = self.viewport().device_pixel_ratio;
        Ok(solid_png(
            (rect.width * ratio).round() as u32,
            (rect.height * ratio).round() as u32,
        ))
    }

    async fn serialize_element_png(&self, element: &NodeId) -> Result<Vec<u8>> {
        if self.fail_serialization {
            return Err(Error::RasterizationFailed {
                node_id: format!("fixture-{element:?}"),
                cause: "serialization disabled".to_owned(),
            });
        }
        let rect = self.bounding_rect(element);
        Ok(solid_png(
            rect.width.round() as u32,
            rect.height.round() as u32,
        ))
    }

    async fn fetch_resource(&self, url: &str) -> Result<(Vec<u8>, String)> {
        self.resources
            .get(url)
            .cloned()
            .ok_or_else(|| Error::AssetFetchFailed {
                url: url.to_owned(),
                cause: "no such fixture resource".to_owned(),
            })
    }
}
