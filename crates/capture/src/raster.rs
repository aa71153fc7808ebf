//! Rasterization fallback: capture an element's rendered pixels when
//! its CSS cannot be mapped exactly. Primary path is the host's
//! visible-tab screenshot; the foreignObject serialization fallback is
//! best-effort. Captured images are validated against the element
//! rect before they are trusted.

use crate::config::{CancelFlag, CaptureConfig};
use crate::host::PageHost;
use crate::traverse::RasterRequest;
use log::warn;
use scene::envelope::encode_data_url;
use scene::{Error, LayoutRect};
use std::collections::HashMap;
use std::io::Cursor;

/// Outcome per rasterized node: a validated data URL, or nothing, in
/// which case the node keeps its `rasterize.reason` and imports as a
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterOutcome {
    Captured { data_url: String },
    Failed,
}

/// Rasterize every flagged element.
///
/// # Errors
/// `Canceled` only; capture failures degrade per node.
pub async fn rasterize_nodes<H: PageHost>(
    host: &H,
    requests: Vec<RasterRequest<H::Element>>,
    config: &CaptureConfig,
    cancel: &CancelFlag,
) -> scene::Result<HashMap<String, RasterOutcome>> {
    let ratio = host.viewport().device_pixel_ratio.max(1.0);
    let mut outcomes = HashMap::new();
    for request in requests {
        cancel.check()?;
        let rect = host.bounding_rect(&request.element);
        let outcome = rasterize_one(host, &request, &rect, ratio, config).await;
        outcomes.insert(request.node_id, outcome);
    }
    Ok(outcomes)
}

async fn rasterize_one<H: PageHost>(
    host: &H,
    request: &RasterRequest<H::Element>,
    rect: &LayoutRect,
    ratio: f64,
    config: &CaptureConfig,
) -> RasterOutcome {
    // Primary: pixel-perfect tab screenshot cropped to the element,
    // in device pixels.
    match host.screenshot_element(&request.element).await {
        Ok(bytes) => {
            if validate_dimensions(&bytes, rect, ratio, config.raster_dimension_tolerance) {
                return RasterOutcome::Captured {
                    data_url: encode_data_url("image/png", &bytes),
                };
            }
            warn!(
                "screenshot for {} failed dimension validation",
                request.node_id
            );
        }
        Err(error) => warn!("screenshot for {} failed: {error}", request.node_id),
    }

    // Fallback: foreignObject serialization at CSS pixel size.
    match host.serialize_element_png(&request.element).await {
        Ok(bytes) => {
            if validate_dimensions(&bytes, rect, 1.0, config.raster_dimension_tolerance) {
                return RasterOutcome::Captured {
                    data_url: encode_data_url("image/png", &bytes),
                };
            }
            warn!(
                "serialized raster for {} failed dimension validation",
                request.node_id
            );
            RasterOutcome::Failed
        }
        Err(error) => {
            let failure = Error::RasterizationFailed {
                node_id: request.node_id.clone(),
                cause: error.to_string(),
            };
            warn!("{failure}");
            RasterOutcome::Failed
        }
    }
}

/// A capture is trusted only when its decoded dimensions are within
/// `tolerance` pixels of the element rect scaled by `ratio`.
fn validate_dimensions(bytes: &[u8], rect: &LayoutRect, ratio: f64, tolerance: f64) -> bool {
    let Some((width, height)) = decode_dimensions(bytes) else {
        return false;
    };
    let expected_width = rect.width * ratio;
    let expected_height = rect.height * ratio;
    let slack = tolerance * ratio;
    (f64::from(width) - expected_width).abs() <= slack
        && (f64::from(height) - expected_height).abs() <= slack
}

fn decode_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FixturePage, solid_png};
    use scene::node::RasterReason;

    fn raster_request(page: &mut FixturePage, width: f64, height: f64) -> RasterRequest<indextree::NodeId> {
        let root = page.root();
        let element = page.add_element(
            root,
            "div",
            LayoutRect::new(0.0, 0.0, width, height),
            &[],
        );
        RasterRequest {
            node_id: "n1".to_owned(),
            element,
            reason: RasterReason::Filter,
        }
    }

    #[tokio::test]
    async fn screenshot_path_produces_validated_data_url() {
        let mut page = FixturePage::blank(800.0, 600.0);
        let request = raster_request(&mut page, 40.0, 40.0);
        let outcomes = rasterize_nodes(
            &page,
            vec![request],
            &CaptureConfig::default(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        let RasterOutcome::Captured { data_url } = &outcomes["n1"] else {
            panic!("expected capture");
        };
        assert!(data_url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn device_pixel_ratio_scales_validation() {
        let mut page = FixturePage::blank(800.0, 600.0);
        page.set_device_pixel_ratio(2.0);
        let request = raster_request(&mut page, 30.0, 20.0);
        let outcomes = rasterize_nodes(
            &page,
            vec![request],
            &CaptureConfig::default(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        let RasterOutcome::Captured { data_url } = &outcomes["n1"] else {
            panic!("expected capture");
        };
        let (_, bytes) = scene::envelope::parse_data_url(data_url).unwrap();
        assert_eq!(decode_dimensions(&bytes), Some((60, 40)));
    }

    #[tokio::test]
    async fn wrong_sized_screenshot_falls_back_then_fails() {
        let mut page = FixturePage::blank(800.0, 600.0);
        let request = raster_request(&mut page, 50.0, 50.0);
        // Pre-seed a screenshot with wrong dimensions and break the
        // fallback too.
        page.set_screenshot(request.element, solid_png(9, 9));
        page.fail_serialization(true);
        let outcomes = rasterize_nodes(
            &page,
            vec![request],
            &CaptureConfig::default(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcomes["n1"], RasterOutcome::Failed);
    }

    #[tokio::test]
    async fn fallback_serialization_is_accepted_at_css_size() {
        let mut page = FixturePage::blank(800.0, 600.0);
        let request = raster_request(&mut page, 25.0, 15.0);
        page.fail_screenshots(true);
        let outcomes = rasterize_nodes(
            &page,
            vec![request],
            &CaptureConfig::default(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        assert!(matches!(outcomes["n1"], RasterOutcome::Captured { .. }));
    }
}
