//! Structural invariant checks run by the assembler before emitting
//! and by the importer on receipt.

use crate::envelope::parse_data_url;
use crate::geometry::is_valid_matrix;
use crate::node::{AnalyzedNode, NodeType};
use crate::schema::SceneSchema;
use std::collections::HashSet;
use std::fmt;

/// One violated invariant, anchored to a node where applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub node_id: Option<String>,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_id {
            Some(id) => write!(formatter, "node {id}: {}", self.message),
            None => write!(formatter, "{}", self.message),
        }
    }
}

/// Check every schema invariant. Returns all violations rather than
/// stopping at the first, so callers can log a complete picture.
#[must_use]
pub fn validate(schema: &SceneSchema) -> Vec<Violation> {
    let mut violations = Vec::new();

    if schema.root.node_type != NodeType::Frame {
        violations.push(Violation {
            node_id: Some(schema.root.id.clone()),
            message: "root must be a FRAME".to_owned(),
        });
    }
    let viewport = schema.metadata.viewport;
    let root_layout = schema.root.absolute_layout;
    if root_layout.width != viewport.width || root_layout.height != viewport.height {
        violations.push(Violation {
            node_id: Some(schema.root.id.clone()),
            message: format!(
                "root is {}x{} but viewport is {}x{}",
                root_layout.width, root_layout.height, viewport.width, viewport.height
            ),
        });
    }

    let mut seen_ids = HashSet::new();
    check_node(schema, &schema.root, None, &mut seen_ids, &mut violations);
    violations
}

fn check_node(
    schema: &SceneSchema,
    node: &AnalyzedNode,
    parent_id: Option<&str>,
    seen_ids: &mut HashSet<String>,
    violations: &mut Vec<Violation>,
) {
    let anchor = || Some(node.id.clone());

    if !seen_ids.insert(node.id.clone()) {
        violations.push(Violation {
            node_id: anchor(),
            message: "duplicate node id".to_owned(),
        });
    }
    if node.parent_id.as_deref() != parent_id {
        violations.push(Violation {
            node_id: anchor(),
            message: format!(
                "parentId {:?} does not match actual parent {:?}",
                node.parent_id, parent_id
            ),
        });
    }
    if !node.absolute_layout.is_well_formed() {
        violations.push(Violation {
            node_id: anchor(),
            message: "layout has non-finite or negative dimensions".to_owned(),
        });
    }
    if let Some(transform) = &node.absolute_transform
        && !is_valid_matrix(&transform.matrix)
    {
        violations.push(Violation {
            node_id: anchor(),
            message: "transform matrix is non-finite or degenerate".to_owned(),
        });
    }
    if node.node_type == NodeType::Image
        && let Some(hash) = &node.image_hash
        && !schema.assets.images.contains_key(hash)
    {
        violations.push(Violation {
            node_id: anchor(),
            message: format!("imageHash {hash} has no asset registry entry"),
        });
    }
    if let Some(rasterize) = &node.rasterize
        && let Some(data_url) = &rasterize.data_url
        && parse_data_url(data_url).is_none_or(|(mime, _)| !mime.starts_with("image/"))
    {
        violations.push(Violation {
            node_id: anchor(),
            message: "rasterize.dataUrl is not a well-formed image data URL".to_owned(),
        });
    }

    for child in &node.children {
        check_node(schema, child, Some(&node.id), seen_ids, violations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{AbsoluteTransform, LayoutRect, Point};
    use crate::node::{AnalyzedNode, NodeType};
    use crate::schema::{Metadata, SceneSchema, ViewportInfo};

    fn schema_with_root() -> SceneSchema {
        let mut root = AnalyzedNode::new("root", NodeType::Frame, "html");
        root.absolute_layout = LayoutRect::new(0.0, 0.0, 1440.0, 900.0);
        let metadata = Metadata {
            viewport: ViewportInfo {
                width: 1440.0,
                height: 900.0,
                device_pixel_ratio: 1.0,
                layout_viewport_width: 1440.0,
                layout_viewport_height: 900.0,
                scroll_height: 900.0,
            },
            screenshot_scale: 1.0,
            ..Metadata::default()
        };
        SceneSchema::new(metadata, root)
    }

    #[test]
    fn valid_schema_produces_no_violations() {
        assert!(validate(&schema_with_root()).is_empty());
    }

    #[test]
    fn root_size_mismatch_is_flagged() {
        let mut schema = schema_with_root();
        schema.root.absolute_layout.width = 100.0;
        let violations = validate(&schema);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("viewport"));
    }

    #[test]
    fn dangling_image_hash_is_flagged() {
        let mut schema = schema_with_root();
        let mut image = AnalyzedNode::new("img1", NodeType::Image, "img");
        image.parent_id = Some("root".to_owned());
        image.absolute_layout = LayoutRect::new(0.0, 0.0, 10.0, 10.0);
        image.image_hash = Some("deadbeef".to_owned());
        schema.root.children.push(image);
        let violations = validate(&schema);
        assert!(violations.iter().any(|violation| violation
            .message
            .contains("no asset registry entry")));
    }

    #[test]
    fn degenerate_transform_is_flagged() {
        let mut schema = schema_with_root();
        let mut child = AnalyzedNode::new("c1", NodeType::Rectangle, "div");
        child.parent_id = Some("root".to_owned());
        child.absolute_layout = LayoutRect::new(0.0, 0.0, 10.0, 10.0);
        child.absolute_transform = Some(AbsoluteTransform {
            matrix: [0.0, 0.0, 0.0, 0.0, 1.0, 1.0],
            origin: Point::new(0.5, 0.5),
        });
        schema.root.children.push(child);
        let violations = validate(&schema);
        assert!(violations.iter().any(|violation| violation
            .message
            .contains("degenerate")));
    }

    #[test]
    fn wrong_parent_id_is_flagged() {
        let mut schema = schema_with_root();
        let mut child = AnalyzedNode::new("c1", NodeType::Rectangle, "div");
        child.parent_id = Some("someone-else".to_owned());
        child.absolute_layout = LayoutRect::new(0.0, 0.0, 10.0, 10.0);
        schema.root.children.push(child);
        let violations = validate(&schema);
        assert!(!violations.is_empty());
    }
}
