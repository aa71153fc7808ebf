//! The `PageHost` trait: the capture agent's seam to a rendered page.
//!
//! Tree walking and computed-style lookup are synchronous — hosts
//! snapshot the page before the agent walks it. Stabilization,
//! screenshots, and resource fetches suspend.

use scene::{LayoutRect, ViewportInfo};
use std::future::Future;
use std::time::Duration;

/// Basic document identity.
#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub url: String,
    pub title: String,
    /// True for browser-internal documents the agent must refuse.
    pub restricted: bool,
}

/// Which pseudo-element a style lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoKind {
    Before,
    After,
}

impl PseudoKind {
    #[inline]
    #[must_use]
    pub const fn selector(self) -> &'static str {
        match self {
            Self::Before => "::before",
            Self::After => "::after",
        }
    }
}

/// Interactive pseudo-state the agent can force for variant capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedState {
    Hover,
    Focus,
}

/// One child slot of an element, in document order.
#[derive(Debug, Clone)]
pub enum ChildEntry<Element> {
    Element(Element),
    /// A run of rendered text.
    Text(String),
}

/// What an `<iframe>` element contains from the agent's point of view.
#[derive(Debug, Clone)]
pub enum FrameContent<Element> {
    /// Not a frame, or an empty frame.
    None,
    /// Same-origin content document; the agent descends into it.
    SameOrigin(Element),
    /// Cross-origin content; the agent can only rasterize the box.
    CrossOrigin,
}

/// A rendered page the agent can capture. Implemented by the headless
/// Chromium driver and by the in-memory fixture host.
pub trait PageHost {
    /// Opaque element handle, cheap to clone. `Eq + Hash` so the
    /// traverser can keep a visited set.
    type Element: Clone + Eq + std::hash::Hash;

    fn document_info(&self) -> DocumentInfo;
    fn viewport(&self) -> ViewportInfo;

    /// Root element of the document (usually `html`), absent for a
    /// document with no rendered elements.
    fn root_element(&self) -> Option<Self::Element>;

    /// Light-DOM children in document order.
    fn children(&self, element: &Self::Element) -> Vec<ChildEntry<Self::Element>>;

    /// Shadow-root children when the element hosts an open shadow
    /// root; the traverser walks these instead of the light DOM.
    fn shadow_children(&self, element: &Self::Element) -> Option<Vec<ChildEntry<Self::Element>>>;

    /// Frame classification for `<iframe>`-like elements.
    fn frame_content(&self, element: &Self::Element) -> FrameContent<Self::Element>;

    fn tag_name(&self, element: &Self::Element) -> String;
    fn attribute(&self, element: &Self::Element, name: &str) -> Option<String>;

    /// Resolved computed style value; empty string when unset, the
    /// same contract as `getComputedStyle`.
    fn computed_style(&self, element: &Self::Element, property: &str) -> String;

    /// Computed style on a pseudo-element; `None` when the pseudo
    /// does not generate a box.
    fn pseudo_style(
        &self,
        element: &Self::Element,
        pseudo: PseudoKind,
        property: &str,
    ) -> Option<String>;

    /// Computed style while a pseudo-state is programmatically forced.
    /// `None` when the host cannot force states.
    fn forced_state_style(
        &self,
        element: &Self::Element,
        state: ForcedState,
        property: &str,
    ) -> Option<String>;

    /// Border-box rect in capture coordinates.
    fn bounding_rect(&self, element: &Self::Element) -> LayoutRect;

    /// Natural pixel size for replaced elements (`naturalWidth` and
    /// `naturalHeight` on images), when the host knows it.
    fn natural_size(&self, element: &Self::Element) -> Option<(f64, f64)>;

    /// Current frame of a `<canvas>` or `<video>` as a data URL.
    fn element_frame_data_url(&self, element: &Self::Element) -> Option<String>;

    /// Root-level CSS custom properties (`--name` → resolved value).
    fn custom_properties(&self) -> Vec<(String, String)>;

    // Stabilization surface -------------------------------------------------

    /// Apply an emulated viewport; used for multi-viewport captures.
    fn set_viewport(
        &self,
        width: f64,
        height: f64,
        device_scale_factor: f64,
    ) -> impl Future<Output = ()> + Send;

    /// Scroll the viewport to a vertical offset.
    fn scroll_to(&self, offset_y: f64) -> impl Future<Output = ()> + Send;

    /// Wait until the page has had no network activity for `window`,
    /// giving up after `budget`. Returns false on give-up.
    fn await_network_quiescence(
        &self,
        window: Duration,
        budget: Duration,
    ) -> impl Future<Output = bool> + Send;

    /// Install the navigation guard: cancel `beforeunload` unloads and
    /// rewrite programmatic `location` assignments to
    /// `history.replaceState` equivalents.
    fn install_navigation_guard(&self);
    fn remove_navigation_guard(&self);

    /// Inject a transient stylesheet; returns a handle for removal.
    fn inject_stylesheet(&self, css: &str) -> u64;
    fn remove_stylesheet(&self, handle: u64);

    // Rasterization surface -------------------------------------------------

    /// Primary rasterization path: visible-tab screenshot cropped to
    /// the element rect, scaled by the device pixel ratio. PNG bytes.
    fn screenshot_element(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = scene::Result<Vec<u8>>> + Send;

    /// Fallback path: foreignObject-style serialization of the
    /// element into a raster. Best-effort, not pixel-perfect.
    fn serialize_element_png(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = scene::Result<Vec<u8>>> + Send;

    // Asset surface ---------------------------------------------------------

    /// Fetch a resource from within the page context. Returns bytes
    /// and MIME type.
    fn fetch_resource(
        &self,
        url: &str,
    ) -> impl Future<Output = scene::Result<(Vec<u8>, String)>> + Send;
}
