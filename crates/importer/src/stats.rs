//! Import statistics. Partial imports are normal: per-node failures
//! are recorded here and the build moves on to the next sibling.

use serde::Serialize;

/// One node that failed to build, with its machine-readable cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedNode {
    pub node_id: String,
    pub kind: String,
    pub message: String,
}

/// Outcome counters for one import.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub total_nodes: usize,
    pub created_nodes: usize,
    pub skipped_nodes: usize,
    pub rasterized_nodes: usize,
    pub failed_nodes: Vec<FailedNode>,
}

impl ImportStats {
    /// True when every node materialized.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_nodes.is_empty() && self.skipped_nodes == 0
    }

    pub fn record_failure(&mut self, node_id: &str, error: &scene::Error) {
        self.failed_nodes.push(FailedNode {
            node_id: node_id.to_owned(),
            kind: error.kind().to_owned(),
            message: error.to_string(),
        });
        self.skipped_nodes += 1;
    }
}

/// Result of importing one payload (possibly multiple viewports).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Host id of the created page.
    pub page_id: String,
    pub stats: ImportStats,
}
