//! Image handle cache: every content hash in the asset registry is
//! uploaded to the design tool once. Rasterized data URLs are decoded
//! per node and never deduped — they are pixel-unique by construction.

use crate::host::DesignHost;
use log::warn;
use scene::envelope::parse_data_url;
use scene::{SceneSchema, registry::ImageAsset};
use std::collections::HashMap;

/// Per-import cache of uploaded image handles, keyed by content hash.
#[derive(Debug, Default)]
pub struct ImageCache<Handle> {
    handles: HashMap<String, Handle>,
}

impl<Handle: Clone> ImageCache<Handle> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }

    /// Upload every registry asset. Individual failures are logged;
    /// affected nodes render as placeholders.
    pub async fn preload<H: DesignHost<ImageHandle = Handle>>(
        &mut self,
        host: &mut H,
        schema: &SceneSchema,
    ) {
        for (hash, asset) in &schema.assets.images {
            if self.handles.contains_key(hash) {
                continue;
            }
            let Some(bytes) = asset_bytes(asset) else {
                warn!("asset {hash} carries no decodable bytes");
                continue;
            };
            match host.create_image(&bytes).await {
                Ok(handle) => {
                    self.handles.insert(hash.clone(), handle);
                }
                Err(error) => warn!("image upload for {hash} failed: {error}"),
            }
        }
    }

    #[must_use]
    pub fn get(&self, hash: &str) -> Option<Handle> {
        self.handles.get(hash).cloned()
    }
}

/// Raw bytes of an asset: the base64 `bytes` field or the data URL.
#[must_use]
pub fn asset_bytes(asset: &ImageAsset) -> Option<Vec<u8>> {
    if let Some(encoded) = &asset.bytes
        && let Some(bytes) = base64_decode(encoded)
    {
        return Some(bytes);
    }
    asset
        .data_url
        .as_deref()
        .and_then(parse_data_url)
        .map(|(_, bytes)| bytes)
}

fn base64_decode(encoded: &str) -> Option<Vec<u8>> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.decode(encoded).ok()
}
