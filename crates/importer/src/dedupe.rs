//! Shared-style binding. The schema's style registry is keyed by
//! fingerprint; the binder creates one shared style per entry in the
//! design tool, then binds nodes whose inline values match.

use crate::host::{DesignHost, SharedStyleKind};
use scene::registry::fingerprint;
use scene::{AnalyzedNode, Paint, SceneSchema};
use std::collections::HashMap;

/// Fingerprint → created shared-style id, per kind.
#[derive(Debug, Default)]
pub struct StyleBinder {
    colors: HashMap<String, String>,
    texts: HashMap<String, String>,
    effects: HashMap<String, String>,
}

impl StyleBinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the shared style entities for every registry entry.
    ///
    /// # Errors
    /// Host-specific style creation failures.
    pub fn prepare<H: DesignHost>(&mut self, host: &mut H, schema: &SceneSchema) -> scene::Result<()> {
        for (key, entry) in &schema.styles.colors {
            let id = host.create_shared_style(SharedStyleKind::Color, &entry.name)?;
            self.colors.insert(key.clone(), id);
        }
        for (key, entry) in &schema.styles.text_styles {
            let id = host.create_shared_style(SharedStyleKind::Text, &entry.name)?;
            self.texts.insert(key.clone(), id);
        }
        for (key, entry) in &schema.styles.effects {
            let id = host.create_shared_style(SharedStyleKind::Effect, &entry.name)?;
            self.effects.insert(key.clone(), id);
        }
        Ok(())
    }

    /// Bind a built node to any shared styles its inline values match.
    ///
    /// # Errors
    /// Host-specific binding failures.
    pub fn bind<H: DesignHost>(
        &self,
        host: &mut H,
        node: &AnalyzedNode,
        target: &H::NodeRef,
    ) -> scene::Result<()> {
        // A single solid fill binds to a color style.
        if let [paint @ Paint::Solid { .. }] = node.fills.as_slice()
            && let Some(style_id) = self.colors.get(&fingerprint::paint(paint))
        {
            host.bind_shared_style(target, SharedStyleKind::Color, style_id)?;
        }
        if let Some(text_style) = &node.text_style
            && let Some(style_id) = self.texts.get(&fingerprint::text(text_style))
        {
            host.bind_shared_style(target, SharedStyleKind::Text, style_id)?;
        }
        if !node.effects.is_empty()
            && let Some(style_id) = self.effects.get(&fingerprint::effects(&node.effects))
        {
            host.bind_shared_style(target, SharedStyleKind::Effect, style_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingHost;
    use scene::registry::ColorStyleEntry;
    use scene::{Metadata, NodeType, Rgba};

    #[test]
    fn matching_fill_binds_to_registry_style() {
        let accent = Paint::solid(Rgba::opaque(0.1, 0.2, 0.3));
        let key = fingerprint::paint(&accent);

        let root = AnalyzedNode::new("root", NodeType::Frame, "html");
        let mut schema = SceneSchema::new(Metadata::default(), root);
        schema.styles.colors.insert(
            key,
            ColorStyleEntry {
                name: "Accent".to_owned(),
                paint: accent.clone(),
                usage_count: 3,
            },
        );

        let mut host = RecordingHost::new();
        let mut binder = StyleBinder::new();
        binder.prepare(&mut host, &schema).unwrap();

        let mut node = AnalyzedNode::new("n1", NodeType::Rectangle, "div");
        node.fills = vec![accent];
        let target = host
            .create_node(crate::host::TargetKind::Rectangle, "n1")
            .unwrap();
        binder.bind(&mut host, &node, &target).unwrap();

        assert_eq!(host.shared_styles.len(), 1);
        assert_eq!(host.node(target).unwrap().bound_styles.len(), 1);
    }
}
