//! Gradient parsing for computed `background-image` layers.
//!
//! The grammar accepted is the browser's computed-style serialization
//! of `linear-gradient(...)` and `radial-gradient(...)`: an optional
//! angle or `to <side>` prelude (linear), an optional shape/position
//! prelude (radial), then comma-separated color stops with optional
//! percentage positions.

use super::color::parse_css_color;
use cssparser::{Parser, ParserInput, Token};
use scene::paint::GradientStop;
use scene::{Paint, Point, Rgba};

/// Parse one computed background layer as a gradient paint. `None`
/// when the layer is not a gradient this model represents.
#[must_use]
pub fn parse_gradient(value: &str) -> Option<Paint> {
    let mut input = ParserInput::new(value.trim());
    let mut parser = Parser::new(&mut input);
    let name = parser.expect_function().ok()?.to_ascii_lowercase();
    let parsed = parser
        .parse_nested_block::<_, _, ()>(|args| {
            Ok(match name.as_str() {
                "linear-gradient" => parse_linear(args),
                "radial-gradient" => parse_radial(args),
                _ => None,
            })
        })
        .ok()
        .flatten()?;
    if parser.is_exhausted() { Some(parsed) } else { None }
}

fn parse_linear(args: &mut Parser<'_, '_>) -> Option<Paint> {
    // Optional direction: an angle dimension or `to <side> [<side>]`.
    let mut angle = 180.0;
    let explicit_angle = args
        .try_parse(|prelude| -> Result<f64, cssparser::ParseError<'_, ()>> {
            let location = prelude.current_source_location();
            match prelude.next()? {
                Token::Dimension { value, unit, .. } => {
                    angle_to_degrees(f64::from(*value), unit.as_ref())
                        .ok_or_else(|| location.new_custom_error(()))
                }
                Token::Ident(keyword) if keyword.eq_ignore_ascii_case("to") => {
                    let mut sides = Vec::new();
                    while let Ok(side) =
                        prelude.try_parse(|inner| inner.expect_ident().map(|ident| ident.to_string()))
                    {
                        sides.push(side.to_ascii_lowercase());
                    }
                    side_keywords_to_degrees(&sides).ok_or_else(|| location.new_custom_error(()))
                }
                _ => Err(location.new_custom_error(())),
            }
        })
        .ok();
    if let Some(value) = explicit_angle {
        angle = value;
        args.expect_comma().ok()?;
    }

    let stops = parse_stops(args)?;
    Some(Paint::GradientLinear {
        angle,
        stops,
        opacity: 1.0,
        visible: true,
    })
}

fn parse_radial(args: &mut Parser<'_, '_>) -> Option<Paint> {
    let mut center = Point::new(0.5, 0.5);

    // If the first item is not a color, it is a shape/size/position
    // prelude terminated by a comma. The probe always errors so the
    // parser rewinds to the start either way.
    let mut first_is_color = false;
    drop(
        args.try_parse(|probe| -> Result<(), cssparser::ParseError<'_, ()>> {
            let location = probe.current_source_location();
            first_is_color = parse_color_token(probe).is_some();
            Err(location.new_custom_error(()))
        }),
    );

    if !first_is_color {
        let mut awaiting_position = false;
        let mut position = Vec::new();
        loop {
            let token = args.next().ok()?.clone();
            match token {
                Token::Comma => break,
                Token::Ident(keyword) if keyword.eq_ignore_ascii_case("at") => {
                    awaiting_position = true;
                }
                Token::Percentage { unit_value, .. } if awaiting_position => {
                    position.push(f64::from(unit_value));
                }
                // Shape and extent keywords, explicit radii: accepted
                // and ignored; the paint model keeps only the center.
                Token::Ident(_) | Token::Dimension { .. } | Token::Number { .. } => {}
                _ => return None,
            }
        }
        if position.len() == 2 {
            center = Point::new(position[0], position[1]);
        }
    }

    let stops = parse_stops(args)?;
    Some(Paint::GradientRadial {
        center,
        stops,
        opacity: 1.0,
        visible: true,
    })
}

/// Comma-separated `<color> <position>?` list. Missing positions are
/// interpolated evenly between their known neighbors.
fn parse_stops(args: &mut Parser<'_, '_>) -> Option<Vec<GradientStop>> {
    let mut raw: Vec<(Rgba, Option<f64>)> = Vec::new();
    loop {
        let color = parse_color_token(args)?;
        let mut positions = 0;
        // Up to two positions per CSS double-position stops.
        while let Ok(position) = args.try_parse(|inner| {
            let location = inner.current_source_location();
            match inner.next() {
                Ok(Token::Percentage { unit_value, .. }) => Ok(f64::from(*unit_value)),
                Ok(_) | Err(_) => Err(location.new_custom_error::<(), ()>(())),
            }
        }) {
            raw.push((color, Some(position)));
            positions += 1;
            if positions == 2 {
                break;
            }
        }
        if positions == 0 {
            raw.push((color, None));
        }
        if args.try_parse(Parser::expect_comma).is_err() {
            break;
        }
    }
    if raw.len() < 2 {
        return None;
    }

    // Fill in missing positions: endpoints default to 0 and 1, interior
    // gaps spread evenly between known anchors.
    let last = raw.len() - 1;
    if raw[0].1.is_none() {
        raw[0].1 = Some(0.0);
    }
    if raw[last].1.is_none() {
        raw[last].1 = Some(1.0);
    }
    let mut anchor = 0;
    for index in 1..raw.len() {
        if let Some(position) = raw[index].1 {
            let gap = index - anchor;
            if gap > 1 {
                let start = raw[anchor].1.unwrap_or(0.0);
                let step = (position - start) / gap as f64;
                for offset in 1..gap {
                    raw[anchor + offset].1 = Some(start + step * offset as f64);
                }
            }
            anchor = index;
        }
    }

    let mut previous = 0.0;
    Some(
        raw.into_iter()
            .map(|(color, position)| {
                // Clamp to non-decreasing 0..1 like browsers do.
                let mut resolved = position.unwrap_or(previous).clamp(0.0, 1.0);
                if resolved < previous {
                    resolved = previous;
                }
                previous = resolved;
                GradientStop {
                    color,
                    position: resolved,
                }
            })
            .collect(),
    )
}

/// One color at the current parser position: hex, named, or an
/// `rgb()`/`rgba()` function as computed styles serialize them.
fn parse_color_token(args: &mut Parser<'_, '_>) -> Option<Rgba> {
    let token = args.next().ok()?.clone();
    match token {
        Token::Hash(value) | Token::IDHash(value) => parse_css_color(&format!("#{value}")),
        Token::Ident(name) => parse_css_color(name.as_ref()),
        Token::Function(name) => {
            let lower = name.to_ascii_lowercase();
            args.parse_nested_block::<_, _, ()>(|inner| Ok(parse_rgb_function(&lower, inner)))
                .ok()
                .flatten()
        }
        _ => None,
    }
}

fn parse_rgb_function(name: &str, inner: &mut Parser<'_, '_>) -> Option<Rgba> {
    if name != "rgb" && name != "rgba" {
        return None;
    }
    let mut channels: Vec<(f64, bool)> = Vec::new();
    while let Ok(token) = inner.next() {
        match token {
            Token::Number { value, .. } => channels.push((f64::from(*value), false)),
            Token::Percentage { unit_value, .. } => channels.push((f64::from(*unit_value), true)),
            Token::Comma | Token::Delim('/') => {}
            _ => return None,
        }
    }
    if channels.len() != 3 && channels.len() != 4 {
        return None;
    }
    let channel = |index: usize| {
        let (value, is_percent) = channels[index];
        if is_percent { value } else { value / 255.0 }
    };
    // Percentage and number alpha both arrive already normalized.
    let alpha = if channels.len() == 4 { channels[3].0 } else { 1.0 };
    Some(Rgba::new(
        channel(0).clamp(0.0, 1.0),
        channel(1).clamp(0.0, 1.0),
        channel(2).clamp(0.0, 1.0),
        alpha.clamp(0.0, 1.0),
    ))
}

fn angle_to_degrees(value: f64, unit: &str) -> Option<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "deg" => Some(value),
        "grad" => Some(value * 0.9),
        "rad" => Some(value.to_degrees()),
        "turn" => Some(value * 360.0),
        _ => None,
    }
}

fn side_keywords_to_degrees(sides: &[String]) -> Option<f64> {
    let mut horizontal = None;
    let mut vertical = None;
    for side in sides {
        match side.as_str() {
            "left" | "right" => horizontal = Some(side.as_str()),
            "top" | "bottom" => vertical = Some(side.as_str()),
            _ => return None,
        }
    }
    Some(match (horizontal, vertical) {
        (None, Some("top")) => 0.0,
        (Some("right"), Some("top")) => 45.0,
        (Some("right"), None) => 90.0,
        (Some("right"), Some("bottom")) => 135.0,
        (None, Some("bottom")) => 180.0,
        (Some("left"), Some("bottom")) => 225.0,
        (Some("left"), None) => 270.0,
        (Some("left"), Some("top")) => 315.0,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_linear_gradient_parses() {
        let paint =
            parse_gradient("linear-gradient(45deg, rgb(255, 0, 0) 0%, rgb(0, 0, 255) 100%)")
                .unwrap();
        let Paint::GradientLinear { angle, stops, .. } = paint else {
            panic!("expected linear gradient");
        };
        assert!((angle - 45.0).abs() < 1e-9);
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].position, 0.0);
        assert_eq!(stops[1].position, 1.0);
        assert!(stops[0].color.approx_eq(&Rgba::opaque(1.0, 0.0, 0.0)));
    }

    #[test]
    fn direction_keywords_and_missing_positions_resolve() {
        let paint = parse_gradient(
            "linear-gradient(to right, rgb(0, 0, 0), rgb(128, 128, 128), rgb(255, 255, 255))",
        )
        .unwrap();
        let Paint::GradientLinear { angle, stops, .. } = paint else {
            panic!("expected linear gradient");
        };
        assert!((angle - 90.0).abs() < 1e-9);
        assert_eq!(stops.len(), 3);
        assert!((stops[1].position - 0.5).abs() < 1e-9);
    }

    #[test]
    fn radial_gradient_center_is_extracted() {
        let paint = parse_gradient(
            "radial-gradient(circle at 25% 75%, rgba(255, 0, 0, 0.5) 0%, rgb(0, 0, 255) 100%)",
        )
        .unwrap();
        let Paint::GradientRadial { center, stops, .. } = paint else {
            panic!("expected radial gradient");
        };
        assert!((center.x - 0.25).abs() < 1e-9);
        assert!((center.y - 0.75).abs() < 1e-9);
        assert_eq!(stops.len(), 2);
    }

    #[test]
    fn non_gradient_layers_are_rejected() {
        assert!(parse_gradient("url(\"https://example.test/a.png\")").is_none());
        assert!(parse_gradient("none").is_none());
        assert!(parse_gradient("conic-gradient(red, blue)").is_none());
    }
}
