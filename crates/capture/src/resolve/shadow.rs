//! `box-shadow` and `filter` parsing.
//!
//! Shadows preserve CSS declaration order. Filters parse into a
//! function list that drives the map-or-rasterize decision: `blur` and
//! `drop-shadow` map to effects, the image-only trio maps to paint
//! filters on IMAGE nodes, and everything else forces rasterization.

use super::color::parse_css_color;
use cssparser::{Parser, ParserInput, Token};
use scene::{Effect, Point, Rgba};

/// Parse a computed `box-shadow` list into ordered effects.
#[must_use]
pub fn parse_box_shadow(value: &str) -> Vec<Effect> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "none" {
        return Vec::new();
    }
    split_top_level_commas(trimmed)
        .iter()
        .filter_map(|part| parse_single_shadow(part))
        .collect()
}

/// One `<shadow>`: lengths in x/y/blur/spread order, a color anywhere,
/// and an optional `inset` keyword anywhere.
fn parse_single_shadow(part: &str) -> Option<Effect> {
    let mut lengths: Vec<f64> = Vec::new();
    let mut color: Option<Rgba> = None;
    let mut inset = false;
    let mut color_text: Option<String> = None;

    let mut input = ParserInput::new(part.trim());
    let mut parser = Parser::new(&mut input);
    loop {
        let Ok(token) = parser.next().map(Token::clone) else {
            break;
        };
        match token {
            Token::Dimension { value, unit, .. } if unit.eq_ignore_ascii_case("px") => {
                lengths.push(f64::from(value));
            }
            Token::Number { value, .. } if value == 0.0 => lengths.push(0.0),
            Token::Ident(keyword) if keyword.eq_ignore_ascii_case("inset") => inset = true,
            Token::Ident(keyword) => color_text = Some(keyword.to_string()),
            Token::Hash(hash) | Token::IDHash(hash) => color_text = Some(format!("#{hash}")),
            Token::Function(name) => {
                let name = name.to_ascii_lowercase();
                let body = parser
                    .parse_nested_block::<_, _, ()>(|args| Ok(collect_raw(args)))
                    .ok()?;
                color = parse_css_color(&format!("{name}({body})"));
            }
            _ => return None,
        }
    }
    if let Some(text) = color_text {
        color = parse_css_color(&text).or(color);
    }

    if lengths.len() < 2 {
        return None;
    }
    let offset = Point::new(lengths[0], lengths[1]);
    let radius = lengths.get(2).copied().unwrap_or(0.0);
    let spread = lengths.get(3).copied().unwrap_or(0.0);
    let color = color.unwrap_or(Rgba::BLACK);
    Some(if inset {
        Effect::InnerShadow {
            color,
            offset,
            radius,
            spread,
            visible: true,
        }
    } else {
        Effect::DropShadow {
            color,
            offset,
            radius,
            spread,
            visible: true,
        }
    })
}

/// A parsed CSS filter function.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterFunction {
    Blur(f64),
    DropShadow(Effect),
    Brightness(f64),
    Contrast(f64),
    Saturate(f64),
    /// Any function outside the representable set; carries its name.
    Unsupported(String),
}

impl FilterFunction {
    /// Whether this function is representable on a non-image node.
    #[inline]
    #[must_use]
    pub const fn maps_to_effect(&self) -> bool {
        matches!(self, Self::Blur(_) | Self::DropShadow(_))
    }

    /// Whether this function is representable as an image paint
    /// filter (IMAGE nodes only).
    #[inline]
    #[must_use]
    pub const fn maps_to_image_filter(&self) -> bool {
        matches!(
            self,
            Self::Brightness(_) | Self::Contrast(_) | Self::Saturate(_)
        )
    }
}

/// Parse a computed `filter` value into its function list. Returns an
/// empty list for `none`.
#[must_use]
pub fn parse_filter_list(value: &str) -> Vec<FilterFunction> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "none" {
        return Vec::new();
    }

    let mut functions = Vec::new();
    let mut input = ParserInput::new(trimmed);
    let mut parser = Parser::new(&mut input);
    loop {
        let Ok(name) = parser.expect_function().map(|name| name.to_ascii_lowercase()) else {
            if functions.is_empty() {
                // `url(#svg-filter)` tokenizes as UnquotedUrl, not a
                // function; treat the whole value as unsupported.
                functions.push(FilterFunction::Unsupported(trimmed.to_owned()));
            }
            break;
        };
        let body = parser.parse_nested_block::<_, _, ()>(|args| Ok(collect_raw(args)));
        let Ok(body) = body else {
            functions.push(FilterFunction::Unsupported(name));
            break;
        };
        functions.push(classify_filter(&name, &body));
        if parser.is_exhausted() {
            break;
        }
    }
    functions
}

fn classify_filter(name: &str, body: &str) -> FilterFunction {
    match name {
        "blur" => parse_px(body).map_or_else(
            || FilterFunction::Unsupported(name.to_owned()),
            FilterFunction::Blur,
        ),
        "drop-shadow" => parse_single_shadow(body).map_or_else(
            || FilterFunction::Unsupported(name.to_owned()),
            FilterFunction::DropShadow,
        ),
        "brightness" => parse_amount(body).map_or_else(
            || FilterFunction::Unsupported(name.to_owned()),
            FilterFunction::Brightness,
        ),
        "contrast" => parse_amount(body).map_or_else(
            || FilterFunction::Unsupported(name.to_owned()),
            FilterFunction::Contrast,
        ),
        "saturate" => parse_amount(body).map_or_else(
            || FilterFunction::Unsupported(name.to_owned()),
            FilterFunction::Saturate,
        ),
        _ => FilterFunction::Unsupported(name.to_owned()),
    }
}

/// Re-serialize the tokens of a nested block, recursing into nested
/// functions, preserving enough shape for a second-stage parse.
fn collect_raw(args: &mut Parser<'_, '_>) -> String {
    let mut out = String::new();
    loop {
        let Ok(token) = args.next().map(Token::clone) else {
            break;
        };
        if !out.is_empty() && token != Token::Comma {
            out.push(' ');
        }
        match token {
            Token::Dimension { value, unit, .. } => {
                out.push_str(&format!("{value}{unit}"));
            }
            Token::Percentage { unit_value, .. } => {
                out.push_str(&format!("{}%", unit_value * 100.0));
            }
            Token::Number { value, .. } => out.push_str(&format!("{value}")),
            Token::Comma => out.push(','),
            Token::Ident(ident) => out.push_str(ident.as_ref()),
            Token::Hash(hash) | Token::IDHash(hash) => {
                out.push('#');
                out.push_str(hash.as_ref());
            }
            Token::Function(name) => {
                let inner = args
                    .parse_nested_block::<_, _, ()>(|nested| Ok(collect_raw(nested)))
                    .unwrap_or_default();
                out.push_str(&format!("{}({inner})", name.as_ref()));
            }
            _ => {}
        }
    }
    out
}

/// Strict pixel length: `12px` or `0`.
#[must_use]
pub fn parse_px(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed == "0" {
        return Some(0.0);
    }
    trimmed
        .strip_suffix("px")
        .and_then(|number| number.trim().parse().ok())
}

/// Filter amount: a number or percentage, normalized so 1.0 is
/// neutral.
fn parse_amount(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if let Some(percent) = trimmed.strip_suffix('%') {
        return percent.trim().parse::<f64>().ok().map(|number| number / 100.0);
    }
    trimmed.parse().ok()
}

/// Split on commas that are not nested inside parentheses.
#[must_use]
pub fn split_top_level_commas(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for character in value.chars() {
        match character {
            '(' => {
                depth += 1;
                current.push(character);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(character);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_owned());
                current.clear();
            }
            _ => current.push(character),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_owned());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_shadow_with_leading_color_parses() {
        // Chrome serializes color-first.
        let effects = parse_box_shadow("rgba(0, 0, 0, 0.3) 0px 2px 4px 0px");
        assert_eq!(effects.len(), 1);
        let Effect::DropShadow {
            color,
            offset,
            radius,
            spread,
            ..
        } = &effects[0]
        else {
            panic!("expected drop shadow");
        };
        assert!((color.alpha - 0.3).abs() < 1e-6);
        assert_eq!(*offset, Point::new(0.0, 2.0));
        assert_eq!(*radius, 4.0);
        assert_eq!(*spread, 0.0);
    }

    #[test]
    fn author_order_and_inset_parse() {
        let effects = parse_box_shadow("0px 1px 2px rgba(10, 20, 30, 0.5), inset 0px 0px 4px red");
        assert_eq!(effects.len(), 2);
        assert!(matches!(effects[0], Effect::DropShadow { .. }));
        assert!(matches!(effects[1], Effect::InnerShadow { .. }));
    }

    #[test]
    fn filter_list_classification() {
        let functions = parse_filter_list("brightness(1.2) blur(3px)");
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0], FilterFunction::Brightness(1.2));
        assert_eq!(functions[1], FilterFunction::Blur(3.0));
        assert!(functions[1].maps_to_effect());
        assert!(functions[0].maps_to_image_filter());
    }

    #[test]
    fn unsupported_filters_are_flagged() {
        let functions = parse_filter_list("hue-rotate(90deg) blur(3px)");
        assert!(matches!(
            functions[0],
            FilterFunction::Unsupported(ref name) if name == "hue-rotate"
        ));
        let url_filter = parse_filter_list("url(#goo)");
        assert!(matches!(url_filter[0], FilterFunction::Unsupported(_)));
    }

    #[test]
    fn percentage_amounts_normalize() {
        let functions = parse_filter_list("saturate(150%)");
        assert_eq!(functions[0], FilterFunction::Saturate(1.5));
    }

    #[test]
    fn top_level_comma_split_respects_nesting() {
        let parts = split_top_level_commas("rgba(0, 0, 0, 0.3) 0px 1px, red 0px 2px");
        assert_eq!(parts.len(), 2);
    }
}
