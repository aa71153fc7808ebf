//! Background layer reduction: `background-image` layers plus the
//! `background-size`/`-repeat`/`-position` combination collapse into
//! the target paint model, or flag the element for rasterization.

use super::shadow::split_top_level_commas;
use scene::ImageFit;

/// One parsed `background-image` layer.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundLayer {
    /// `url(...)` with the unquoted URL.
    Url(String),
    /// A gradient function, kept raw for the gradient parser.
    Gradient(String),
    /// A layer the paint model cannot express (`conic-gradient`,
    /// `image-set`, `element()`, cross-fades).
    Unsupported(String),
}

/// Split a computed `background-image` into layers, top layer first as
/// CSS serializes them.
#[must_use]
pub fn parse_background_layers(value: &str) -> Vec<BackgroundLayer> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "none" {
        return Vec::new();
    }
    split_top_level_commas(trimmed)
        .into_iter()
        .filter(|layer| layer != "none")
        .map(|layer| classify_layer(&layer))
        .collect()
}

fn classify_layer(layer: &str) -> BackgroundLayer {
    if let Some(url) = strip_url(layer) {
        return BackgroundLayer::Url(url);
    }
    let lower = layer.to_ascii_lowercase();
    if lower.starts_with("linear-gradient(") || lower.starts_with("radial-gradient(") {
        BackgroundLayer::Gradient(layer.to_owned())
    } else {
        BackgroundLayer::Unsupported(layer.to_owned())
    }
}

/// Unwrap `url("...")` / `url(...)` to the bare URL.
#[must_use]
pub fn strip_url(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let body = trimmed
        .strip_prefix("url(")
        .and_then(|rest| rest.strip_suffix(')'))?;
    let unquoted = body
        .trim()
        .trim_matches(|character| character == '"' || character == '\'');
    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.to_owned())
    }
}

/// How one image layer's size/repeat/position combination reduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    Fit(ImageFit),
    /// No exact target representation; rasterize the element.
    Unrepresentable,
}

/// Reduce `background-size` + `background-repeat` + `background-position`
/// to a target scale mode.
///
/// - any repeat → TILE (at intrinsic size; sized tiles are not exact)
/// - `cover` → FILL (aspect preserved by the paint)
/// - `contain` → FIT
/// - `auto` → CROP (intrinsic size honored)
/// - `100% 100%` → FILL
/// - other explicit sizes or offset positions → unrepresentable
#[must_use]
pub fn reduce_background_fit(size: &str, repeat: &str, position: &str) -> FitOutcome {
    let size = normalize(size);
    let repeat = normalize(repeat);
    let position = normalize(position);

    let repeats = !(repeat.is_empty() || repeat == "no-repeat");
    if repeats {
        return if size.is_empty() || size == "auto" || size == "auto auto" {
            FitOutcome::Fit(ImageFit::Tile)
        } else {
            // Scaled tiles have no exact representation.
            FitOutcome::Unrepresentable
        };
    }

    let centered_or_origin = matches!(
        position.as_str(),
        "" | "0% 0%" | "0px 0px" | "left top" | "50% 50%" | "center" | "center center"
    );
    if !centered_or_origin {
        return FitOutcome::Unrepresentable;
    }

    match size.as_str() {
        "cover" => FitOutcome::Fit(ImageFit::Fill),
        "contain" => FitOutcome::Fit(ImageFit::Fit),
        "" | "auto" | "auto auto" => FitOutcome::Fit(ImageFit::Crop),
        "100% 100%" => FitOutcome::Fit(ImageFit::Fill),
        _ => FitOutcome::Unrepresentable,
    }
}

/// Map `object-fit` on replaced elements per the intrinsic-size table.
/// `cover` maps to FILL, not CROP: the paint preserves aspect, and the
/// crop-transform matrix CROP would need is never computed.
#[must_use]
pub fn object_fit_to_image_fit(object_fit: &str) -> ImageFit {
    match normalize(object_fit).as_str() {
        "contain" | "scale-down" => ImageFit::Fit,
        "none" => ImageFit::Crop,
        _ => ImageFit::Fill,
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_split_and_classify() {
        let layers = parse_background_layers(
            "linear-gradient(rgb(0, 0, 0), rgb(255, 255, 255)), url(\"https://example.test/bg.png\")",
        );
        assert_eq!(layers.len(), 2);
        assert!(matches!(layers[0], BackgroundLayer::Gradient(_)));
        assert_eq!(
            layers[1],
            BackgroundLayer::Url("https://example.test/bg.png".to_owned())
        );
    }

    #[test]
    fn conic_gradients_are_unsupported() {
        let layers = parse_background_layers("conic-gradient(red, blue)");
        assert!(matches!(layers[0], BackgroundLayer::Unsupported(_)));
    }

    #[test]
    fn fit_reduction_matches_table() {
        assert_eq!(
            reduce_background_fit("cover", "no-repeat", "50% 50%"),
            FitOutcome::Fit(ImageFit::Fill)
        );
        assert_eq!(
            reduce_background_fit("contain", "no-repeat", "50% 50%"),
            FitOutcome::Fit(ImageFit::Fit)
        );
        assert_eq!(
            reduce_background_fit("auto", "repeat", "0% 0%"),
            FitOutcome::Fit(ImageFit::Tile)
        );
        assert_eq!(
            reduce_background_fit("auto", "no-repeat", "0% 0%"),
            FitOutcome::Fit(ImageFit::Crop)
        );
        assert_eq!(
            reduce_background_fit("37px 19px", "no-repeat", "0% 0%"),
            FitOutcome::Unrepresentable
        );
        assert_eq!(
            reduce_background_fit("cover", "no-repeat", "10px 40px"),
            FitOutcome::Unrepresentable
        );
    }

    #[test]
    fn object_fit_table_holds() {
        assert_eq!(object_fit_to_image_fit("fill"), ImageFit::Fill);
        assert_eq!(object_fit_to_image_fit("cover"), ImageFit::Fill);
        assert_eq!(object_fit_to_image_fit("contain"), ImageFit::Fit);
        assert_eq!(object_fit_to_image_fit("scale-down"), ImageFit::Fit);
        assert_eq!(object_fit_to_image_fit("none"), ImageFit::Crop);
    }
}
