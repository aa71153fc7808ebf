//! Typed error taxonomy shared by all three processes.
//!
//! Every surfaced error carries a stable machine-readable kind (the
//! enum discriminant, also exposed as a string for wire responses) and
//! a human-readable message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Capture requested on a document the agent cannot access
    /// (browser-internal pages and similar).
    #[error("capture is not permitted on this document: {0}")]
    RestrictedDocument(String),

    /// The page did not reach network/layout quiescence in time.
    #[error("page did not stabilize within {budget_ms} ms")]
    StabilizationTimeout { budget_ms: u64 },

    /// An image, video, or font resource could not be acquired.
    #[error("failed to acquire asset {url}: {cause}")]
    AssetFetchFailed { url: String, cause: String },

    /// Bytes were acquired but dimensions could not be determined.
    #[error("intrinsic size unavailable for {0}")]
    IntrinsicSizeUnavailable(String),

    /// Both the primary and the fallback rasterization paths failed.
    #[error("rasterization failed for node {node_id}: {cause}")]
    RasterizationFailed { node_id: String, cause: String },

    /// The broker rejected a payload over the configured limit.
    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A chunked submission aborted before all chunks arrived.
    #[error("chunked transfer incomplete: {0}")]
    IncompleteTransfer(String),

    /// The importer saw a schema version it cannot consume.
    #[error("schema version {found} is not compatible with {supported}")]
    IncompatibleSchema { found: String, supported: String },

    /// A font stayed unavailable after walking the fallback stack.
    #[error("font {family} ({style}) could not be loaded")]
    FontLoadFailed { family: String, style: String },

    /// A per-node build failure, caught at the node boundary.
    #[error("failed to build node {node_id}: {cause}")]
    NodeBuildFailed { node_id: String, cause: String },

    /// Cooperative user cancellation observed at a suspension point.
    #[error("operation canceled")]
    Canceled,
}

impl Error {
    /// Stable machine-readable kind string, used in wire responses and
    /// log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RestrictedDocument(_) => "RestrictedDocument",
            Self::StabilizationTimeout { .. } => "StabilizationTimeout",
            Self::AssetFetchFailed { .. } => "AssetFetchFailed",
            Self::IntrinsicSizeUnavailable(_) => "IntrinsicSizeUnavailable",
            Self::RasterizationFailed { .. } => "RasterizationFailed",
            Self::PayloadTooLarge { .. } => "PayloadTooLarge",
            Self::IncompleteTransfer(_) => "IncompleteTransfer",
            Self::IncompatibleSchema { .. } => "IncompatibleSchema",
            Self::FontLoadFailed { .. } => "FontLoadFailed",
            Self::NodeBuildFailed { .. } => "NodeBuildFailed",
            Self::Canceled => "Canceled",
        }
    }

    /// Whether the error is recovered locally (placeholder, fallback,
    /// skip) rather than surfaced to the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FontLoadFailed { .. }
                | Self::AssetFetchFailed { .. }
                | Self::NodeBuildFailed { .. }
                | Self::IntrinsicSizeUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_strings() {
        let error = Error::PayloadTooLarge {
            size: 10,
            limit: 5,
        };
        assert_eq!(error.kind(), "PayloadTooLarge");
        assert!(!error.is_recoverable());
        let recovered = Error::FontLoadFailed {
            family: "Inter".into(),
            style: "Italic".into(),
        };
        assert!(recovered.is_recoverable());
    }
}
