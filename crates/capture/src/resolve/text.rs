//! Typography resolution for TEXT nodes. Values come from the
//! rendered element's computed style; the resolved family leads and
//! the rest of the stack is recorded for importer fallback.

use super::shadow::parse_px;
use scene::TextStyle;
use scene::node::{FontStyle, TextAlign, TextCase, TextDecoration};

/// Build a `TextStyle` from a computed-style lookup.
pub fn resolve_text_style(read: impl Fn(&str) -> String) -> TextStyle {
    let font_size = parse_px(&read("font-size")).unwrap_or(16.0);
    let family_stack = parse_family_stack(&read("font-family"));
    let (font_family, font_fallbacks) = match family_stack.split_first() {
        Some((first, rest)) => (first.clone(), rest.to_vec()),
        None => ("sans-serif".to_owned(), Vec::new()),
    };

    TextStyle {
        font_family,
        font_fallbacks,
        font_weight: parse_font_weight(&read("font-weight")),
        font_style: parse_font_style(&read("font-style")),
        font_size,
        line_height: resolve_line_height(&read("line-height"), font_size),
        letter_spacing: parse_px(&read("letter-spacing")).unwrap_or(0.0),
        text_decoration: parse_decoration(&read("text-decoration-line")),
        text_align: parse_align(&read("text-align")),
        text_case: parse_case(&read("text-transform")),
        text_auto_resize: scene::node::TextAutoResize::None,
    }
}

/// Split a `font-family` stack into individual family names, unquoted.
#[must_use]
pub fn parse_family_stack(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|family| {
            family
                .trim()
                .trim_matches(|character| character == '"' || character == '\'')
                .to_owned()
        })
        .filter(|family| !family.is_empty())
        .collect()
}

fn parse_font_weight(value: &str) -> u16 {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "normal" => 400,
        "bold" => 700,
        other => other.parse::<f64>().map_or(400, |weight| weight as u16),
    }
}

fn parse_font_style(value: &str) -> FontStyle {
    let lower = value.trim().to_ascii_lowercase();
    if lower == "italic" {
        FontStyle::Italic
    } else if lower.starts_with("oblique") {
        FontStyle::Oblique
    } else {
        FontStyle::Normal
    }
}

/// Line height in CSS pixels. `normal` approximates the browser
/// default of 1.2 times the font size.
fn resolve_line_height(value: &str, font_size: f64) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "normal" {
        return (font_size * 1.2 * 100.0).round() / 100.0;
    }
    parse_px(trimmed).unwrap_or_else(|| {
        // A bare number would be unitless; computed styles resolve it,
        // but tolerate it for fixture data.
        trimmed
            .parse::<f64>()
            .map_or(font_size * 1.2, |factor| factor * font_size)
    })
}

fn parse_decoration(value: &str) -> TextDecoration {
    let lower = value.trim().to_ascii_lowercase();
    if lower.contains("underline") {
        TextDecoration::Underline
    } else if lower.contains("line-through") {
        TextDecoration::Strikethrough
    } else {
        TextDecoration::None
    }
}

fn parse_align(value: &str) -> TextAlign {
    match value.trim().to_ascii_lowercase().as_str() {
        "center" => TextAlign::Center,
        "right" | "end" => TextAlign::Right,
        "justify" => TextAlign::Justified,
        _ => TextAlign::Left,
    }
}

fn parse_case(value: &str) -> TextCase {
    match value.trim().to_ascii_lowercase().as_str() {
        "uppercase" => TextCase::Upper,
        "lowercase" => TextCase::Lower,
        "capitalize" => TextCase::Title,
        _ => TextCase::Original,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn style_table(entries: &[(&str, &str)]) -> impl Fn(&str) -> String {
        let map: HashMap<String, String> = entries
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        move |name: &str| map.get(name).cloned().unwrap_or_default()
    }

    #[test]
    fn resolved_family_leads_and_stack_follows() {
        let style = resolve_text_style(style_table(&[
            ("font-family", "\"Inter\", Helvetica, sans-serif"),
            ("font-size", "18px"),
            ("font-weight", "600"),
            ("line-height", "27px"),
        ]));
        assert_eq!(style.font_family, "Inter");
        assert_eq!(style.font_fallbacks, vec!["Helvetica", "sans-serif"]);
        assert_eq!(style.font_weight, 600);
        assert_eq!(style.font_size, 18.0);
        assert_eq!(style.line_height, 27.0);
    }

    #[test]
    fn normal_line_height_approximates_in_pixels() {
        let style = resolve_text_style(style_table(&[
            ("font-family", "serif"),
            ("font-size", "20px"),
            ("line-height", "normal"),
        ]));
        assert_eq!(style.line_height, 24.0);
    }

    #[test]
    fn keywords_map_to_enums() {
        let style = resolve_text_style(style_table(&[
            ("font-family", "serif"),
            ("font-style", "italic"),
            ("font-weight", "bold"),
            ("text-decoration-line", "underline"),
            ("text-align", "center"),
            ("text-transform", "uppercase"),
        ]));
        assert_eq!(style.font_style, FontStyle::Italic);
        assert_eq!(style.font_weight, 700);
        assert_eq!(style.text_decoration, TextDecoration::Underline);
        assert_eq!(style.text_align, TextAlign::Center);
        assert_eq!(style.text_case, TextCase::Upper);
    }
}
