//! Headless capture driver: implements the capture agent's `PageHost`
//! over a Chromium instance driven through the DevTools protocol.
//!
//! The page is snapshotted by one in-page script (styles, rects,
//! pseudo-elements, natural sizes); tree walking and style lookup then
//! run synchronously against the snapshot, while screenshots, scrolls,
//! and viewport changes go through the protocol. The snapshot refreshes
//! at stabilization suspension points, so traversal always sees the
//! settled page.

pub mod snapshot;

use capture::{ChildEntry, DocumentInfo, ForcedState, FrameContent, PageHost, PseudoKind};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt as _;
use log::{debug, warn};
use scene::{Error, LayoutRect, Result, ViewportInfo};
use snapshot::{PageSnapshot, SnapshotChild, SnapshotNode, snapshot_script};
use std::sync::Mutex;
use std::time::Duration;

/// Script installed while capture runs: swallows unload prompts and
/// rewrites programmatic navigation to history.replaceState calls.
const NAVIGATION_GUARD_JS: &str = r"(() => {
  if (window.__captureGuard) return;
  const onBeforeUnload = (event) => { event.preventDefault(); event.returnValue = ''; };
  window.addEventListener('beforeunload', onBeforeUnload, true);
  const assign = window.location.assign.bind(window.location);
  window.__captureGuard = {
    onBeforeUnload,
    assign,
  };
  try {
    window.location.assign = (target) => history.replaceState(null, '', window.location.href);
    window.location.replace = (target) => history.replaceState(null, '', window.location.href);
  } catch (err) {}
})()";

const NAVIGATION_GUARD_REMOVE_JS: &str = r"(() => {
  const guard = window.__captureGuard;
  if (!guard) return;
  window.removeEventListener('beforeunload', guard.onBeforeUnload, true);
  try { window.location.assign = guard.assign; } catch (err) {}
  delete window.__captureGuard;
})()";

/// A live Chromium page behind the capture agent's host seam.
pub struct HeadlessPage {
    page: Page,
    snapshot: Mutex<PageSnapshot>,
    http: reqwest::Client,
    // Keeps the browser process and its event loop alive.
    _browser: Browser,
    _handler: tokio::task::JoinHandle<()>,
}

impl HeadlessPage {
    /// Launch a browser, open the URL, and take the first snapshot.
    ///
    /// # Errors
    /// Browser launch, navigation, or snapshot failures.
    pub async fn launch(url: &str, width: u32, height: u32) -> anyhow::Result<Self> {
        let config = BrowserConfig::builder()
            .window_size(width, height)
            .build()
            .map_err(|message| anyhow::anyhow!("browser config error: {message}"))?;
        let (browser, mut handler) = Browser::launch(config).await?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser.new_page(url).await?;
        page.wait_for_navigation().await?;

        let host = Self {
            page,
            snapshot: Mutex::new(PageSnapshot::default()),
            http: reqwest::Client::new(),
            _browser: browser,
            _handler: handler_task,
        };
        host.refresh_snapshot().await?;
        Ok(host)
    }

    /// Re-run the snapshot script against the live page.
    ///
    /// # Errors
    /// Evaluation or deserialization failures.
    pub async fn refresh_snapshot(&self) -> anyhow::Result<()> {
        let evaluated = self.page.evaluate(snapshot_script()).await?;
        let fresh: PageSnapshot = evaluated.into_value()?;
        debug!(
            "snapshot refreshed: {} node(s) at {}x{}",
            fresh.nodes.len(),
            fresh.viewport_width,
            fresh.viewport_height
        );
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = fresh;
        }
        Ok(())
    }

    fn with_node<T>(&self, index: usize, read: impl FnOnce(&SnapshotNode) -> T) -> Option<T> {
        self.snapshot
            .lock()
            .ok()
            .and_then(|snapshot| snapshot.nodes.get(index).map(read))
    }

    fn child_entries(children: &[SnapshotChild]) -> Vec<ChildEntry<usize>> {
        children
            .iter()
            .map(|child| match child {
                SnapshotChild::Element { el } => ChildEntry::Element(*el),
                SnapshotChild::Text { text } => ChildEntry::Text(text.clone()),
            })
            .collect()
    }

    async fn run_js(&self, script: String) {
        if let Err(error) = self.page.evaluate(script).await {
            warn!("in-page script failed: {error}");
        }
    }
}

impl PageHost for HeadlessPage {
    type Element = usize;

    fn document_info(&self) -> DocumentInfo {
        self.snapshot
            .lock()
            .map(|snapshot| DocumentInfo {
                url: snapshot.url.clone(),
                title: snapshot.title.clone(),
                restricted: snapshot.restricted
                    || snapshot.url.starts_with("chrome://")
                    || snapshot.url.starts_with("about:"),
            })
            .unwrap_or_default()
    }

    fn viewport(&self) -> ViewportInfo {
        self.snapshot
            .lock()
            .map(|snapshot| ViewportInfo {
                width: snapshot.viewport_width,
                height: snapshot.viewport_height,
                device_pixel_ratio: snapshot.device_pixel_ratio.max(1.0),
                layout_viewport_width: snapshot.viewport_width,
                layout_viewport_height: snapshot.viewport_height,
                scroll_height: snapshot.scroll_height,
            })
            .unwrap_or_default()
    }

    fn root_element(&self) -> Option<usize> {
        self.snapshot
            .lock()
            .ok()
            .filter(|snapshot| !snapshot.nodes.is_empty())
            .map(|_| 0)
    }

    fn children(&self, element: &usize) -> Vec<ChildEntry<usize>> {
        self.with_node(*element, |node| Self::child_entries(&node.children))
            .unwrap_or_default()
    }

    fn shadow_children(&self, element: &usize) -> Option<Vec<ChildEntry<usize>>> {
        self.with_node(*element, |node| {
            node.shadow.as_deref().map(Self::child_entries)
        })
        .flatten()
    }

    fn frame_content(&self, element: &usize) -> FrameContent<usize> {
        self.with_node(*element, |node| {
            if let Some(root) = node.frame_root {
                FrameContent::SameOrigin(root)
            } else if node.frame_cross_origin {
                FrameContent::CrossOrigin
            } else {
                FrameContent::None
            }
        })
        .unwrap_or(FrameContent::None)
    }

    fn tag_name(&self, element: &usize) -> String {
        self.with_node(*element, |node| node.tag.clone())
            .unwrap_or_default()
    }

    fn attribute(&self, element: &usize, name: &str) -> Option<String> {
        self.with_node(*element, |node| node.attrs.get(name).cloned())
            .flatten()
    }

    fn computed_style(&self, element: &usize, property: &str) -> String {
        self.with_node(*element, |node| {
            node.styles.get(property).cloned().unwrap_or_default()
        })
        .unwrap_or_default()
    }

    fn pseudo_style(&self, element: &usize, pseudo: PseudoKind, property: &str) -> Option<String> {
        self.with_node(*element, |node| {
            let styles = match pseudo {
                PseudoKind::Before => node.before.as_ref()?,
                PseudoKind::After => node.after.as_ref()?,
            };
            Some(styles.get(property).cloned().unwrap_or_default())
        })
        .flatten()
    }

    fn forced_state_style(
        &self,
        _element: &usize,
        _state: ForcedState,
        _property: &str,
    ) -> Option<String> {
        // Forced pseudo-states need a re-snapshot per element; the
        // headless driver does not capture variants.
        None
    }

    fn bounding_rect(&self, element: &usize) -> LayoutRect {
        self.with_node(*element, |node| {
            LayoutRect::new(
                node.rect.left,
                node.rect.top,
                node.rect.width,
                node.rect.height,
            )
        })
        .unwrap_or_default()
    }

    fn natural_size(&self, element: &usize) -> Option<(f64, f64)> {
        self.with_node(*element, |node| {
            match (node.natural_width, node.natural_height) {
                (Some(width), Some(height)) => Some((width, height)),
                _ => None,
            }
        })
        .flatten()
    }

    fn element_frame_data_url(&self, element: &usize) -> Option<String> {
        self.with_node(*element, |node| node.frame_data_url.clone())
            .flatten()
    }

    fn custom_properties(&self) -> Vec<(String, String)> {
        self.snapshot
            .lock()
            .map(|snapshot| snapshot.custom_properties.clone())
            .unwrap_or_default()
    }

    async fn set_viewport(&self, width: f64, height: f64, device_scale_factor: f64) {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(device_scale_factor)
            .mobile(false)
            .build();
        match params {
            Ok(params) => {
                if let Err(error) = self.page.execute(params).await {
                    warn!("viewport override failed: {error}");
                }
            }
            Err(message) => warn!("viewport override params invalid: {message}"),
        }
        if let Err(error) = self.refresh_snapshot().await {
            warn!("snapshot refresh after viewport change failed: {error}");
        }
    }

    async fn scroll_to(&self, offset_y: f64) {
        self.run_js(format!("window.scrollTo(0, {offset_y})")).await;
        if offset_y == 0.0 {
            // Back at origin: refresh so traversal sees post-sweep
            // layout and lazy-loaded content.
            if let Err(error) = self.refresh_snapshot().await {
                warn!("snapshot refresh after sweep failed: {error}");
            }
        }
    }

    async fn await_network_quiescence(&self, window: Duration, budget: Duration) -> bool {
        // The protocol driver approximates quiescence with a settle
        // delay bounded by the remaining budget.
        tokio::time::sleep(window.min(budget)).await;
        true
    }

    fn install_navigation_guard(&self) {
        let page = self.page.clone();
        tokio::spawn(async move {
            if let Err(error) = page.evaluate(NAVIGATION_GUARD_JS).await {
                warn!("navigation guard install failed: {error}");
            }
        });
    }

    fn remove_navigation_guard(&self) {
        let page = self.page.clone();
        tokio::spawn(async move {
            if let Err(error) = page.evaluate(NAVIGATION_GUARD_REMOVE_JS).await {
                warn!("navigation guard removal failed: {error}");
            }
        });
    }

    fn inject_stylesheet(&self, css: &str) -> u64 {
        static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
        let handle = NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let escaped = css.replace('`', "\\`");
        let page = self.page.clone();
        tokio::spawn(async move {
            let script = format!(
                "(() => {{ const style = document.createElement('style'); \
                 style.id = 'capture-style-{handle}'; style.textContent = `{escaped}`; \
                 document.head.appendChild(style); }})()"
            );
            if let Err(error) = page.evaluate(script).await {
                warn!("stylesheet injection failed: {error}");
            }
        });
        handle
    }

    fn remove_stylesheet(&self, handle: u64) {
        let page = self.page.clone();
        tokio::spawn(async move {
            let script = format!(
                "(() => {{ const style = document.getElementById('capture-style-{handle}'); \
                 if (style) style.remove(); }})()"
            );
            if let Err(error) = page.evaluate(script).await {
                warn!("stylesheet removal failed: {error}");
            }
        });
    }

    async fn screenshot_element(&self, element: &usize) -> Result<Vec<u8>> {
        let rect = self.bounding_rect(element);
        let ratio = self.viewport().device_pixel_ratio;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport {
                x: rect.left,
                y: rect.top,
                width: rect.width,
                height: rect.height,
                scale: ratio,
            })
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|error| Error::RasterizationFailed {
                node_id: format!("element-{element}"),
                cause: error.to_string(),
            })
    }

    async fn serialize_element_png(&self, element: &usize) -> Result<Vec<u8>> {
        // The protocol screenshot is always available here; the
        // foreignObject fallback belongs to the in-extension agent.
        Err(Error::RasterizationFailed {
            node_id: format!("element-{element}"),
            cause: "serialization fallback unavailable in the headless driver".to_owned(),
        })
    }

    async fn fetch_resource(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| Error::AssetFetchFailed {
                url: url.to_owned(),
                cause: error.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(Error::AssetFetchFailed {
                url: url.to_owned(),
                cause: format!("status {}", response.status()),
            });
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_owned();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| Error::AssetFetchFailed {
                url: url.to_owned(),
                cause: error.to_string(),
            })?;
        Ok((bytes.to_vec(), mime))
    }
}
