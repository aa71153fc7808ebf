//! Border resolution: uniform borders become a stroke, asymmetric
//! borders are decomposed into four edge rectangles that preserve
//! pixel geometry.

use super::color::{is_transparent, parse_css_color};
use super::shadow::parse_px;
use scene::paint::SideWeights;
use scene::{LayoutRect, Paint, Rgba, StrokeAlign};

/// One resolved border side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderSide {
    pub width: f64,
    pub color: Rgba,
    /// False for `none`/`hidden` styles or zero width.
    pub visible: bool,
}

/// All four sides in top/right/bottom/left order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderSides {
    pub top: BorderSide,
    pub right: BorderSide,
    pub bottom: BorderSide,
    pub left: BorderSide,
}

/// How the border maps onto the node model.
#[derive(Debug, Clone, PartialEq)]
pub enum BorderResolution {
    /// No visible border.
    None,
    /// All visible sides agree: one stroke paint, inside-aligned as
    /// CSS borders are.
    Uniform {
        paint: Paint,
        weight: f64,
        align: StrokeAlign,
    },
    /// Sides differ; decompose into edge rectangles.
    Decomposed {
        sides: BorderSides,
        weights: SideWeights,
    },
}

/// Resolve one side from its computed width/style/color triple.
fn resolve_side(width: &str, style: &str, color: &str) -> BorderSide {
    let style = style.trim().to_ascii_lowercase();
    let width = parse_px(width).unwrap_or(0.0);
    let hidden = style.is_empty() || style == "none" || style == "hidden" || width <= 0.0;
    let color = parse_css_color(color).unwrap_or(Rgba::BLACK);
    BorderSide {
        width,
        color,
        visible: !hidden && !is_transparent_color(color),
    }
}

fn is_transparent_color(color: Rgba) -> bool {
    color.alpha == 0.0
}

/// Resolve the border from a computed-style lookup (`property name` →
/// resolved value).
pub fn resolve_border(read: impl Fn(&str) -> String) -> BorderResolution {
    let side = |name: &str| {
        resolve_side(
            &read(&format!("border-{name}-width")),
            &read(&format!("border-{name}-style")),
            &read(&format!("border-{name}-color")),
        )
    };
    let sides = BorderSides {
        top: side("top"),
        right: side("right"),
        bottom: side("bottom"),
        left: side("left"),
    };
    let all = [sides.top, sides.right, sides.bottom, sides.left];

    if all.iter().all(|side| !side.visible) {
        return BorderResolution::None;
    }

    let first_visible = all.iter().find(|side| side.visible).copied();
    let uniform = first_visible.is_some_and(|reference| {
        all.iter().all(|side| {
            side.visible
                && side.width == reference.width
                && side.color.approx_eq(&reference.color)
        })
    });
    if uniform && let Some(reference) = first_visible {
        return BorderResolution::Uniform {
            paint: Paint::solid(reference.color),
            weight: reference.width,
            align: StrokeAlign::Inside,
        };
    }

    BorderResolution::Decomposed {
        sides,
        weights: SideWeights {
            top: sides.top.width,
            right: sides.right.width,
            bottom: sides.bottom.width,
            left: sides.left.width,
        },
    }
}

/// Edge rectangles for a decomposed border, inside the border box.
/// Corner squares go to the horizontal edges, matching how collapsed
/// borders paint when widths differ.
#[must_use]
pub fn edge_rectangles(rect: &LayoutRect, sides: &BorderSides) -> Vec<(LayoutRect, Rgba, &'static str)> {
    let mut edges = Vec::new();
    if sides.top.visible {
        edges.push((
            LayoutRect::new(rect.left, rect.top, rect.width, sides.top.width),
            sides.top.color,
            "top",
        ));
    }
    if sides.bottom.visible {
        edges.push((
            LayoutRect::new(
                rect.left,
                rect.bottom() - sides.bottom.width,
                rect.width,
                sides.bottom.width,
            ),
            sides.bottom.color,
            "bottom",
        ));
    }
    let inner_top = rect.top + if sides.top.visible { sides.top.width } else { 0.0 };
    let inner_bottom = rect.bottom()
        - if sides.bottom.visible {
            sides.bottom.width
        } else {
            0.0
        };
    let inner_height = (inner_bottom - inner_top).max(0.0);
    if sides.left.visible {
        edges.push((
            LayoutRect::new(rect.left, inner_top, sides.left.width, inner_height),
            sides.left.color,
            "left",
        ));
    }
    if sides.right.visible {
        edges.push((
            LayoutRect::new(
                rect.right() - sides.right.width,
                inner_top,
                sides.right.width,
                inner_height,
            ),
            sides.right.color,
            "right",
        ));
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style_table(entries: &[(&str, &str)]) -> impl Fn(&str) -> String {
        let map: std::collections::HashMap<String, String> = entries
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        move |name: &str| map.get(name).cloned().unwrap_or_default()
    }

    #[test]
    fn uniform_border_becomes_single_stroke() {
        let read = style_table(&[
            ("border-top-width", "2px"),
            ("border-top-style", "solid"),
            ("border-top-color", "rgb(0, 0, 255)"),
            ("border-right-width", "2px"),
            ("border-right-style", "solid"),
            ("border-right-color", "rgb(0, 0, 255)"),
            ("border-bottom-width", "2px"),
            ("border-bottom-style", "solid"),
            ("border-bottom-color", "rgb(0, 0, 255)"),
            ("border-left-width", "2px"),
            ("border-left-style", "solid"),
            ("border-left-color", "rgb(0, 0, 255)"),
        ]);
        let BorderResolution::Uniform { weight, align, .. } = resolve_border(read) else {
            panic!("expected uniform border");
        };
        assert_eq!(weight, 2.0);
        assert_eq!(align, StrokeAlign::Inside);
    }

    #[test]
    fn zero_width_border_is_none() {
        let read = style_table(&[]);
        assert_eq!(resolve_border(read), BorderResolution::None);
    }

    #[test]
    fn asymmetric_border_decomposes_with_exact_geometry() {
        let read = style_table(&[
            ("border-top-width", "4px"),
            ("border-top-style", "solid"),
            ("border-top-color", "rgb(255, 0, 0)"),
            ("border-bottom-width", "1px"),
            ("border-bottom-style", "solid"),
            ("border-bottom-color", "rgb(0, 255, 0)"),
        ]);
        let resolution = resolve_border(read);
        let BorderResolution::Decomposed { sides, weights } = resolution else {
            panic!("expected decomposition");
        };
        assert_eq!(weights.top, 4.0);
        assert_eq!(weights.bottom, 1.0);
        assert!(!weights.is_uniform());

        let rect = LayoutRect::new(10.0, 20.0, 100.0, 50.0);
        let edges = edge_rectangles(&rect, &sides);
        assert_eq!(edges.len(), 2);
        // Top edge spans the full width at the top.
        assert_eq!(edges[0].0, LayoutRect::new(10.0, 20.0, 100.0, 4.0));
        // Bottom edge hugs the bottom.
        assert_eq!(edges[1].0, LayoutRect::new(10.0, 69.0, 100.0, 1.0));
    }
}
