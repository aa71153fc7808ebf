//! Font loading with fallback. Every `(family, style)` pair referenced
//! by a schema is loaded before any TEXT node is built; failures fall
//! through the recorded stack and finally to the host's guaranteed
//! family. A per-schema cache prevents redundant loads.

use crate::host::DesignHost;
use log::{debug, warn};
use scene::node::FontStyle;
use scene::{SceneSchema, TextStyle};
use std::collections::HashMap;

/// Style name a design tool expects for a weight/italic combination.
#[must_use]
pub fn style_name(text_style: &TextStyle) -> String {
    let bold = text_style.font_weight >= 600;
    let italic = matches!(text_style.font_style, FontStyle::Italic | FontStyle::Oblique);
    match (bold, italic) {
        (true, true) => "Bold Italic".to_owned(),
        (true, false) => "Bold".to_owned(),
        (false, true) => "Italic".to_owned(),
        (false, false) => "Regular".to_owned(),
    }
}

/// Per-schema font cache: requested `(family, style)` → family that
/// actually loaded.
#[derive(Debug, Default)]
pub struct FontCache {
    resolved: HashMap<(String, String), String>,
}

impl FontCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every font the schema references. Called once per import,
    /// before node building starts.
    pub async fn preload<H: DesignHost>(&mut self, host: &mut H, schema: &SceneSchema) {
        let mut styles = Vec::new();
        schema.root.visit(&mut |node| {
            if let Some(text_style) = &node.text_style {
                styles.push(text_style.clone());
            }
        });
        for text_style in styles {
            self.resolve(host, &text_style).await;
        }
    }

    /// Resolve the family to use for a text style, walking the
    /// fallback stack on load failure. Always succeeds: the last rung
    /// is the host's guaranteed family.
    pub async fn resolve<H: DesignHost>(&mut self, host: &mut H, text_style: &TextStyle) -> String {
        let style = style_name(text_style);
        let key = (text_style.font_family.clone(), style.clone());
        if let Some(resolved) = self.resolved.get(&key) {
            return resolved.clone();
        }

        let mut candidates = Vec::with_capacity(text_style.font_fallbacks.len() + 2);
        candidates.push(text_style.font_family.clone());
        candidates.extend(text_style.font_fallbacks.iter().cloned());
        let guaranteed = host.guaranteed_family();
        if !candidates.contains(&guaranteed) {
            candidates.push(guaranteed.clone());
        }

        for candidate in candidates {
            match host.load_font(&candidate, &style).await {
                Ok(()) => {
                    if candidate != text_style.font_family {
                        debug!(
                            "font {} ({style}) unavailable; substituted {candidate}",
                            text_style.font_family
                        );
                    }
                    self.resolved.insert(key, candidate.clone());
                    return candidate;
                }
                Err(error) => warn!("{error}"),
            }
        }

        // The guaranteed family refused the requested style; retry it
        // as Regular rather than failing the text node.
        drop(host.load_font(&guaranteed, "Regular").await);
        self.resolved.insert(key, guaranteed.clone());
        guaranteed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingHost;

    fn text_style(family: &str, fallbacks: &[&str], weight: u16) -> TextStyle {
        TextStyle {
            font_family: family.to_owned(),
            font_fallbacks: fallbacks.iter().map(|name| (*name).to_owned()).collect(),
            font_weight: weight,
            font_style: FontStyle::Normal,
            font_size: 16.0,
            line_height: 20.0,
            letter_spacing: 0.0,
            text_decoration: scene::node::TextDecoration::None,
            text_align: scene::node::TextAlign::Left,
            text_case: scene::node::TextCase::Original,
            text_auto_resize: scene::node::TextAutoResize::None,
        }
    }

    #[tokio::test]
    async fn missing_family_falls_through_stack() {
        let mut host = RecordingHost::new();
        let mut cache = FontCache::new();
        let resolved = cache
            .resolve(&mut host, &text_style("Nonexistent Sans", &["Georgia"], 400))
            .await;
        assert_eq!(resolved, "Georgia");
        assert_eq!(host.loaded_fonts(), vec![("Georgia".to_owned(), "Regular".to_owned())]);
    }

    #[tokio::test]
    async fn fully_missing_stack_lands_on_guaranteed_family() {
        let mut host = RecordingHost::new();
        let mut cache = FontCache::new();
        let resolved = cache
            .resolve(&mut host, &text_style("Nope", &["AlsoNope"], 700))
            .await;
        assert_eq!(resolved, "Inter");
    }

    #[tokio::test]
    async fn resolution_is_cached_per_pair() {
        let mut host = RecordingHost::new();
        let mut cache = FontCache::new();
        let style = text_style("Georgia", &[], 400);
        let first = cache.resolve(&mut host, &style).await;
        let second = cache.resolve(&mut host, &style).await;
        assert_eq!(first, second);
        assert_eq!(host.loaded_fonts().len(), 1);
    }

    #[test]
    fn style_names_cover_weight_and_slant() {
        let mut style = text_style("Inter", &[], 400);
        assert_eq!(style_name(&style), "Regular");
        style.font_weight = 700;
        assert_eq!(style_name(&style), "Bold");
        style.font_style = FontStyle::Italic;
        assert_eq!(style_name(&style), "Bold Italic");
    }
}
