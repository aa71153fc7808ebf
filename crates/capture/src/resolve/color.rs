//! CSS `<color>` parsing for computed-style strings.

use scene::Rgba;

/// Parse a computed CSS color into normalized RGBA channels.
///
/// Computed styles serialize colors as `rgb(r, g, b)` /
/// `rgba(r, g, b, a)`, but named colors, hex forms, and the modern
/// functional notations appear in fixture data and author-supplied
/// strings, so the full grammar is accepted.
#[must_use]
pub fn parse_css_color(input: &str) -> Option<Rgba> {
    let parsed: csscolorparser::Color = input.trim().parse().ok()?;
    let [red, green, blue, alpha] = parsed.to_array();
    Some(Rgba::new(
        f64::from(red),
        f64::from(green),
        f64::from(blue),
        f64::from(alpha),
    ))
}

/// True when the value is missing or fully transparent, in which case
/// no paint is emitted.
#[must_use]
pub fn is_transparent(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "transparent" {
        return true;
    }
    parse_css_color(trimmed).is_none_or(|color| color.alpha == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_rgb_forms_parse() {
        let red = parse_css_color("rgb(255, 0, 0)").unwrap();
        assert!(red.approx_eq(&Rgba::opaque(1.0, 0.0, 0.0)));
        let translucent = parse_css_color("rgba(0, 0, 0, 0.3)").unwrap();
        assert!((translucent.alpha - 0.3).abs() < 1e-6);
    }

    #[test]
    fn named_and_hex_forms_parse() {
        assert!(parse_css_color("red").is_some());
        assert!(parse_css_color("#aabbcc").is_some());
        assert!(parse_css_color("not-a-color").is_none());
    }

    #[test]
    fn transparent_values_are_detected() {
        assert!(is_transparent(""));
        assert!(is_transparent("transparent"));
        assert!(is_transparent("rgba(0, 0, 0, 0)"));
        assert!(!is_transparent("rgb(1, 2, 3)"));
    }
}
