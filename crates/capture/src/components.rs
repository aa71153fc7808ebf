//! Component detection: subtrees sharing a structural signature are
//! grouped into a definition with one master and the rest as
//! instances. Only structure is considered; the optional enhancer may
//! refine labels afterwards without changing the tree.

use scene::AnalyzedNode;
use scene::registry::{ComponentDefinition, ComponentRegistry};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash as _, Hasher as _};

/// Minimum child count for a subtree to be component-shaped at all.
const MIN_STRUCTURE: usize = 1;

/// Group repeated subtrees into component definitions. A signature
/// must repeat at least `threshold` times to produce a definition.
#[must_use]
pub fn detect_components(root: &AnalyzedNode, threshold: usize) -> ComponentRegistry {
    let mut by_signature: HashMap<String, Vec<String>> = HashMap::new();
    collect(root, &mut by_signature);

    let mut registry = ComponentRegistry::default();
    let mut entries: Vec<(String, Vec<String>)> = by_signature
        .into_iter()
        .filter(|(_, node_ids)| node_ids.len() >= threshold.max(2))
        .collect();
    entries.sort_by(|left, right| left.0.cmp(&right.0));

    for (index, (signature, node_ids)) in entries.into_iter().enumerate() {
        let Some((master, instances)) = node_ids.split_first() else {
            continue;
        };
        registry.definitions.insert(
            format!("comp-{index}"),
            ComponentDefinition {
                master_node_id: master.clone(),
                signature,
                instance_node_ids: instances.to_vec(),
            },
        );
    }
    registry
}

fn collect(node: &AnalyzedNode, by_signature: &mut HashMap<String, Vec<String>>) {
    if node.children.len() >= MIN_STRUCTURE && node.parent_id.is_some() {
        by_signature
            .entry(signature(node))
            .or_default()
            .push(node.id.clone());
    }
    for child in &node.children {
        collect(child, by_signature);
    }
}

/// Structural fingerprint: tag, ordered child tag shape, and a coarse
/// layout/fill resolution so visually different repeats do not merge.
#[must_use]
pub fn signature(node: &AnalyzedNode) -> String {
    let mut hasher = DefaultHasher::new();
    node.html_tag.hash(&mut hasher);
    shape_of(node).hash(&mut hasher);
    // Coarse size bucket (16 px) keeps repeats with minor size jitter
    // together while separating different component scales.
    ((node.absolute_layout.width / 16.0) as i64).hash(&mut hasher);
    ((node.absolute_layout.height / 16.0) as i64).hash(&mut hasher);
    node.fills.len().hash(&mut hasher);
    format!("{}:{:08x}", node.html_tag, hasher.finish() & 0xffff_ffff)
}

fn shape_of(node: &AnalyzedNode) -> String {
    let children: Vec<String> = node
        .children
        .iter()
        .map(|child| format!("{}[{}]", child.html_tag, child.children.len()))
        .collect();
    children.join(",")
}
