//! Page snapshot: one in-page script walks the rendered tree and
//! returns everything the capture agent reads synchronously —
//! computed styles for a fixed property list, border-box rects in
//! document coordinates, pseudo-element styles, natural sizes, and
//! root custom properties.

use serde::Deserialize;
use std::collections::HashMap;

/// Computed-style properties the capture agent reads.
pub const STYLE_PROPERTIES: &[&str] = &[
    "display",
    "visibility",
    "opacity",
    "background-color",
    "background-image",
    "background-size",
    "background-repeat",
    "background-position",
    "border-top-width",
    "border-top-style",
    "border-top-color",
    "border-right-width",
    "border-right-style",
    "border-right-color",
    "border-bottom-width",
    "border-bottom-style",
    "border-bottom-color",
    "border-left-width",
    "border-left-style",
    "border-left-color",
    "border-top-left-radius",
    "border-top-right-radius",
    "border-bottom-right-radius",
    "border-bottom-left-radius",
    "box-shadow",
    "filter",
    "backdrop-filter",
    "transform",
    "transform-origin",
    "mix-blend-mode",
    "isolation",
    "overflow",
    "position",
    "z-index",
    "will-change",
    "color",
    "font-family",
    "font-size",
    "font-weight",
    "font-style",
    "line-height",
    "letter-spacing",
    "text-decoration-line",
    "text-align",
    "text-transform",
    "object-fit",
    "cursor",
];

/// One child slot in the snapshot tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SnapshotChild {
    Element { el: usize },
    Text { text: String },
}

/// One snapshotted element.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotNode {
    pub tag: String,
    pub attrs: HashMap<String, String>,
    pub rect: SnapshotRect,
    pub styles: HashMap<String, String>,
    pub children: Vec<SnapshotChild>,
    /// Shadow-root children when the element hosts an open root.
    pub shadow: Option<Vec<SnapshotChild>>,
    /// Same-origin frame content root index.
    pub frame_root: Option<usize>,
    /// Cross-origin frame marker.
    pub frame_cross_origin: bool,
    pub before: Option<HashMap<String, String>>,
    pub after: Option<HashMap<String, String>>,
    pub natural_width: Option<f64>,
    pub natural_height: Option<f64>,
    /// Canvas/video frame exported as a data URL.
    pub frame_data_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct SnapshotRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// The whole snapshot returned by the in-page script.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub restricted: bool,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub device_pixel_ratio: f64,
    pub scroll_height: f64,
    pub nodes: Vec<SnapshotNode>,
    pub custom_properties: Vec<(String, String)>,
}

/// Build the snapshot script with the property list inlined.
#[must_use]
pub fn snapshot_script() -> String {
    let properties = STYLE_PROPERTIES
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"(() => {{
  const PROPS = [{properties}];
  const nodes = [];
  const readStyles = (cs) => {{
    const out = {{}};
    for (const prop of PROPS) out[prop] = cs.getPropertyValue(prop);
    return out;
  }};
  const walk = (el) => {{
    const id = nodes.length;
    const rect = el.getBoundingClientRect();
    const cs = getComputedStyle(el);
    const attrs = {{}};
    for (const attr of el.attributes || []) attrs[attr.name] = attr.value;
    const rec = {{
      tag: el.tagName.toLowerCase(),
      attrs,
      rect: {{
        left: rect.left + window.scrollX,
        top: rect.top + window.scrollY,
        width: rect.width,
        height: rect.height
      }},
      styles: readStyles(cs),
      children: [],
      frameCrossOrigin: false
    }};
    nodes.push(rec);
    for (const pseudo of ["::before", "::after"]) {{
      const pcs = getComputedStyle(el, pseudo);
      const content = pcs.getPropertyValue("content");
      if (content && content !== "none" && content !== "normal") {{
        const key = pseudo === "::before" ? "before" : "after";
        const styles = readStyles(pcs);
        styles["content"] = content;
        rec[key] = styles;
      }}
    }}
    if (el.tagName === "IMG") {{
      rec.naturalWidth = el.naturalWidth || null;
      rec.naturalHeight = el.naturalHeight || null;
    }}
    if (el.tagName === "CANVAS") {{
      try {{ rec.frameDataUrl = el.toDataURL("image/png"); }} catch (err) {{}}
      rec.naturalWidth = el.width;
      rec.naturalHeight = el.height;
    }}
    if (el.tagName === "VIDEO") {{
      rec.naturalWidth = el.videoWidth || null;
      rec.naturalHeight = el.videoHeight || null;
    }}
    if (el.tagName === "IFRAME" || el.tagName === "FRAME") {{
      try {{
        const doc = el.contentDocument;
        if (doc && doc.documentElement) {{
          rec.frameRoot = walk(doc.documentElement);
        }} else {{
          rec.frameCrossOrigin = true;
        }}
      }} catch (err) {{
        rec.frameCrossOrigin = true;
      }}
      return id;
    }}
    for (const child of el.childNodes) {{
      if (child.nodeType === Node.TEXT_NODE) {{
        if (child.textContent && child.textContent.trim()) {{
          rec.children.push({{ text: child.textContent }});
        }}
      }} else if (child.nodeType === Node.ELEMENT_NODE) {{
        rec.children.push({{ el: walk(child) }});
      }}
    }}
    if (el.shadowRoot) {{
      rec.shadow = [];
      for (const child of el.shadowRoot.children) {{
        rec.shadow.push({{ el: walk(child) }});
      }}
    }}
    return id;
  }};
  walk(document.documentElement);
  const rootStyles = getComputedStyle(document.documentElement);
  const customProperties = [];
  for (const name of rootStyles) {{
    if (name.startsWith("--")) {{
      customProperties.push([name, rootStyles.getPropertyValue(name).trim()]);
    }}
  }}
  return {{
    url: location.href,
    title: document.title,
    restricted: false,
    viewportWidth: window.innerWidth,
    viewportHeight: window.innerHeight,
    devicePixelRatio: window.devicePixelRatio,
    scrollHeight: document.documentElement.scrollHeight,
    nodes,
    customProperties
  }};
}})()"#
    )
}
