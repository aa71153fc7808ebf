//! Asset acquirer: fetch or probe every referenced image source,
//! derive intrinsic sizes, content-hash and dedupe into the asset
//! registry. Fetches run under a small bounded concurrency so one
//! slow asset cannot serialize the rest.

use crate::config::{CancelFlag, CaptureConfig};
use crate::host::PageHost;
use crate::traverse::{AssetPurpose, AssetRequest, AssetSource};
use futures::StreamExt as _;
use log::{debug, warn};
use scene::envelope::parse_data_url;
use scene::node::IntrinsicSize;
use scene::registry::FontAsset;
use scene::{AssetRegistry, Error, ImageAsset, ImageFit, TextStyle};
use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash as _, Hasher as _};
use std::io::Cursor;
use std::time::Duration;

/// How one node changes once its asset settled.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetPatch {
    /// IMAGE node: point at the registry entry.
    NodeImage {
        hash: String,
        intrinsic_size: IntrinsicSize,
        fit: ImageFit,
    },
    /// Append an IMAGE paint to the node's fills, at its layer
    /// position.
    BackgroundPaint {
        hash: String,
        fit: ImageFit,
        ordinal: usize,
    },
    /// Acquisition failed: neutral placeholder fill plus an
    /// element-screenshot fallback marker.
    Placeholder,
}

/// Result of the acquisition phase.
#[derive(Debug, Default)]
pub struct AcquiredAssets {
    pub registry: AssetRegistry,
    /// node id → patches, applied by the assembler.
    pub patches: HashMap<String, Vec<AssetPatch>>,
}

/// A source key for probe-cache dedup: identical URLs are fetched
/// once.
fn source_key<Element>(source: &AssetSource<Element>) -> Option<String> {
    match source {
        AssetSource::Url(url) => Some(format!("url:{url}")),
        AssetSource::DataUrl(data_url) => Some(format!("data:{data_url}")),
        AssetSource::ElementFrame(_) => None,
    }
}

/// Fetch every requested asset and build the registry.
///
/// # Errors
/// `Canceled` only; individual fetch failures degrade to placeholder
/// patches per the failure policy.
pub async fn acquire_assets<H: PageHost>(
    host: &H,
    requests: Vec<AssetRequest<H::Element>>,
    text_styles: &[TextStyle],
    config: &CaptureConfig,
    cancel: &CancelFlag,
) -> scene::Result<AcquiredAssets> {
    cancel.check()?;
    let mut acquired = AcquiredAssets {
        registry: AssetRegistry {
            fonts: collect_fonts(text_styles),
            ..AssetRegistry::default()
        },
        ..AcquiredAssets::default()
    };

    // Group by source so each unique URL is probed exactly once.
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<AssetRequest<H::Element>>> = HashMap::new();
    let mut frame_requests: Vec<AssetRequest<H::Element>> = Vec::new();
    for request in requests {
        match source_key(&request.source) {
            Some(key) => {
                let bucket = grouped.entry(key.clone()).or_default();
                if bucket.is_empty() {
                    order.push(key);
                }
                bucket.push(request);
            }
            None => frame_requests.push(request),
        }
    }

    // Unique sources under bounded concurrency.
    let fetches = futures::stream::iter(order.into_iter().map(|key| {
        let representative = grouped
            .get(&key)
            .and_then(|bucket| bucket.first())
            .cloned();
        async move {
            let outcome = match representative {
                Some(request) => fetch_source(host, &request.source, config).await,
                None => Err(Error::AssetFetchFailed {
                    url: key.clone(),
                    cause: "empty request bucket".to_owned(),
                }),
            };
            (key, outcome)
        }
    }))
    .buffer_unordered(config.asset_concurrency.max(1))
    .collect::<Vec<_>>()
    .await;
    cancel.check()?;

    let mut by_key: HashMap<String, scene::Result<FetchedAsset>> = fetches.into_iter().collect();

    for (key, bucket) in grouped {
        let outcome = by_key.remove(&key).unwrap_or_else(|| {
            Err(Error::AssetFetchFailed {
                url: key,
                cause: "fetch result missing".to_owned(),
            })
        });
        apply_outcome(&mut acquired, outcome, bucket);
    }

    // Element frames are host-local and cheap; fetch serially.
    for request in frame_requests {
        cancel.check()?;
        let outcome = fetch_source(host, &request.source, config).await;
        apply_outcome(&mut acquired, outcome, vec![request]);
    }

    Ok(acquired)
}

/// Bytes plus derived facts for one fetched source.
#[derive(Debug, Clone)]
struct FetchedAsset {
    bytes: Vec<u8>,
    mime: String,
    url: Option<String>,
    intrinsic: Option<IntrinsicSize>,
    has_alpha: bool,
}

async fn fetch_source<H: PageHost>(
    host: &H,
    source: &AssetSource<H::Element>,
    config: &CaptureConfig,
) -> scene::Result<FetchedAsset> {
    match source {
        AssetSource::Url(url) if url.starts_with("data:") => {
            decode_data_source(url, None).ok_or_else(|| Error::AssetFetchFailed {
                url: url.clone(),
                cause: "malformed data URL".to_owned(),
            })
        }
        AssetSource::Url(url) => {
            let timeout = Duration::from_millis(config.probe_remote_timeout_ms);
            let fetched = tokio::time::timeout(timeout, host.fetch_resource(url))
                .await
                .map_err(|_| Error::AssetFetchFailed {
                    url: url.clone(),
                    cause: format!("probe timed out after {} ms", config.probe_remote_timeout_ms),
                })??;
            let (bytes, mime) = fetched;
            Ok(inspect_bytes(bytes, mime, Some(url.clone())))
        }
        AssetSource::DataUrl(data_url) => {
            let timeout = Duration::from_millis(config.probe_data_url_timeout_ms);
            // Decoding is synchronous; the timeout bound is nominal.
            let decoded = tokio::time::timeout(timeout, async {
                decode_data_source(data_url, None)
            })
            .await
            .ok()
            .flatten();
            decoded.ok_or_else(|| Error::AssetFetchFailed {
                url: "data:…".to_owned(),
                cause: "malformed data URL".to_owned(),
            })
        }
        AssetSource::ElementFrame(element) => {
            let data_url =
                host.element_frame_data_url(element)
                    .ok_or_else(|| Error::AssetFetchFailed {
                        url: "element-frame".to_owned(),
                        cause: "element has no drawable frame".to_owned(),
                    })?;
            decode_data_source(&data_url, None).ok_or_else(|| Error::AssetFetchFailed {
                url: "element-frame".to_owned(),
                cause: "frame data URL malformed".to_owned(),
            })
        }
    }
}

fn decode_data_source(data_url: &str, original_url: Option<String>) -> Option<FetchedAsset> {
    let (mime, bytes) = parse_data_url(data_url)?;
    Some(inspect_bytes(bytes, mime, original_url))
}

/// Decode image dimensions and alpha; failures leave the intrinsic
/// size to the caller's fallback chain.
fn inspect_bytes(bytes: Vec<u8>, mime: String, url: Option<String>) -> FetchedAsset {
    let decoded = image::ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.decode().ok());
    let (intrinsic, has_alpha) = match decoded {
        Some(decoded_image) => (
            Some(IntrinsicSize::new(
                f64::from(decoded_image.width()),
                f64::from(decoded_image.height()),
            )),
            decoded_image.color().has_alpha(),
        ),
        None => (None, mime.contains("png") || mime.contains("webp")),
    };
    FetchedAsset {
        bytes,
        mime,
        url,
        intrinsic,
        has_alpha,
    }
}

fn apply_outcome<Element>(
    acquired: &mut AcquiredAssets,
    outcome: scene::Result<FetchedAsset>,
    bucket: Vec<AssetRequest<Element>>,
) {
    match outcome {
        Ok(fetched) => {
            let hash = content_hash(&fetched.bytes);
            for request in &bucket {
                // Intrinsic size: decoded pixels, the host's natural
                // size, then the unavailable fallback of 1x1 (FILL).
                let (intrinsic, fit) = match fetched.intrinsic.or_else(|| {
                    request
                        .known_natural_size
                        .map(|(width, height)| IntrinsicSize::new(width, height))
                }) {
                    Some(size) => (size, request.fit),
                    None => {
                        warn!("intrinsic size unavailable for asset {hash}");
                        (IntrinsicSize::new(1.0, 1.0), ImageFit::Fill)
                    }
                };
                acquired
                    .registry
                    .images
                    .entry(hash.clone())
                    .or_insert_with(|| ImageAsset {
                        url: fetched.url.clone(),
                        data_url: Some(scene::envelope::encode_data_url(
                            &fetched.mime,
                            &fetched.bytes,
                        )),
                        bytes: None,
                        intrinsic_size: intrinsic,
                        mime_type: fetched.mime.clone(),
                        has_alpha: fetched.has_alpha,
                    });
                let patch = match request.purpose {
                    AssetPurpose::NodeImage => AssetPatch::NodeImage {
                        hash: hash.clone(),
                        intrinsic_size: intrinsic,
                        fit,
                    },
                    AssetPurpose::BackgroundLayer => AssetPatch::BackgroundPaint {
                        hash: hash.clone(),
                        fit,
                        ordinal: request.ordinal,
                    },
                };
                acquired
                    .patches
                    .entry(request.node_id.clone())
                    .or_default()
                    .push(patch);
            }
            debug!("acquired asset {hash} for {} node(s)", bucket.len());
        }
        Err(error) => {
            warn!("asset acquisition failed: {error}");
            for request in bucket {
                acquired
                    .patches
                    .entry(request.node_id)
                    .or_default()
                    .push(AssetPatch::Placeholder);
            }
        }
    }
}

/// Stable content hash for dedup, rendered as hex.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Collapse observed text styles into the font registry.
fn collect_fonts(text_styles: &[TextStyle]) -> BTreeMap<String, FontAsset> {
    let mut fonts: BTreeMap<String, FontAsset> = BTreeMap::new();
    for style in text_styles {
        let entry = fonts
            .entry(style.font_family.clone())
            .or_insert_with(|| FontAsset {
                family: style.font_family.clone(),
                weights: Vec::new(),
                styles: Vec::new(),
                source: None,
            });
        if !entry.weights.contains(&style.font_weight) {
            entry.weights.push(style.font_weight);
            entry.weights.sort_unstable();
        }
        let style_name = format!("{:?}", style.font_style).to_lowercase();
        if !entry.styles.contains(&style_name) {
            entry.styles.push(style_name);
        }
    }
    fonts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FixturePage, solid_png};
    use scene::LayoutRect;

    fn request(node_id: &str, url: &str) -> AssetRequest<indextree::NodeId> {
        AssetRequest {
            node_id: node_id.to_owned(),
            source: AssetSource::Url(url.to_owned()),
            purpose: AssetPurpose::NodeImage,
            fit: ImageFit::Fill,
            known_natural_size: None,
            ordinal: 0,
        }
    }

    #[tokio::test]
    async fn identical_urls_are_fetched_once_and_deduped() {
        let mut page = FixturePage::blank(800.0, 600.0);
        page.add_resource("https://example.test/a.png", solid_png(10, 5), "image/png");

        let requests = vec![
            request("n1", "https://example.test/a.png"),
            request("n2", "https://example.test/a.png"),
        ];
        let acquired = acquire_assets(
            &page,
            requests,
            &[],
            &CaptureConfig::default(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(acquired.registry.images.len(), 1);
        let asset = acquired.registry.images.values().next().unwrap();
        assert_eq!(asset.intrinsic_size, IntrinsicSize::new(10.0, 5.0));
        assert_eq!(acquired.patches.len(), 2);
    }

    #[tokio::test]
    async fn missing_resources_degrade_to_placeholders() {
        let page = FixturePage::blank(800.0, 600.0);
        let acquired = acquire_assets(
            &page,
            vec![request("n1", "https://example.test/missing.png")],
            &[],
            &CaptureConfig::default(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        assert!(acquired.registry.images.is_empty());
        assert_eq!(
            acquired.patches.get("n1"),
            Some(&vec![AssetPatch::Placeholder])
        );
    }

    #[tokio::test]
    async fn data_urls_decode_without_fetching() {
        let page = FixturePage::blank(800.0, 600.0);
        let data_url = scene::envelope::encode_data_url("image/png", &solid_png(3, 4));
        let acquired = acquire_assets(
            &page,
            vec![request("n1", &data_url)],
            &[],
            &CaptureConfig::default(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        let asset = acquired.registry.images.values().next().unwrap();
        assert_eq!(asset.intrinsic_size, IntrinsicSize::new(3.0, 4.0));
    }

    #[test]
    fn font_registry_collects_weights_and_styles() {
        let mut style = TextStyle {
            font_family: "Inter".to_owned(),
            font_fallbacks: vec![],
            font_weight: 400,
            font_style: scene::node::FontStyle::Normal,
            font_size: 16.0,
            line_height: 20.0,
            letter_spacing: 0.0,
            text_decoration: scene::node::TextDecoration::None,
            text_align: scene::node::TextAlign::Left,
            text_case: scene::node::TextCase::Original,
            text_auto_resize: scene::node::TextAutoResize::None,
        };
        let regular = style.clone();
        style.font_weight = 700;
        style.font_style = scene::node::FontStyle::Italic;
        let fonts = collect_fonts(&[regular, style]);
        let inter = fonts.get("Inter").unwrap();
        assert_eq!(inter.weights, vec![400, 700]);
        assert_eq!(inter.styles, vec!["normal", "italic"]);
    }
}
