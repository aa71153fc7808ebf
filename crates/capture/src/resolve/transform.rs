//! CSS transform parsing: function lists composed into one affine
//! 2x3 matrix, and `matrix3d` projection with degeneracy detection.

use cssparser::{Parser, ParserInput, Token};
use scene::geometry::{IDENTITY, Matrix, is_identity, is_valid_matrix, multiply};
use scene::{LayoutRect, Point};

/// Outcome of resolving a computed `transform` value.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// `none` or the identity.
    Identity,
    /// A representable affine matrix.
    Affine(Matrix),
    /// A 3D transform whose 2D projection loses information, or an
    /// unparseable value; the element must be rasterized.
    Degenerate,
}

/// Parse a computed `transform` list into a single affine matrix.
/// Functions compose left-to-right as CSS specifies.
#[must_use]
pub fn parse_transform(value: &str) -> TransformOutcome {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "none" {
        return TransformOutcome::Identity;
    }

    let mut input = ParserInput::new(trimmed);
    let mut parser = Parser::new(&mut input);
    let mut combined = IDENTITY;
    let mut parsed_any = false;
    loop {
        let name = match parser.expect_function() {
            Ok(name) => name.to_ascii_lowercase(),
            Err(_) => {
                if parsed_any {
                    break;
                }
                return TransformOutcome::Degenerate;
            }
        };
        let arguments = parser.parse_nested_block::<_, _, ()>(|args| Ok(collect_arguments(args)));
        let Ok(Some(arguments)) = arguments else {
            return TransformOutcome::Degenerate;
        };
        let Some(matrix) = function_to_matrix(&name, &arguments) else {
            return TransformOutcome::Degenerate;
        };
        combined = multiply(&combined, &matrix);
        parsed_any = true;
        if parser.is_exhausted() {
            break;
        }
    }

    if is_identity(&combined) {
        TransformOutcome::Identity
    } else if is_valid_matrix(&combined) {
        TransformOutcome::Affine(combined)
    } else {
        TransformOutcome::Degenerate
    }
}

/// One transform argument: a number, a length, or an angle converted
/// to radians.
#[derive(Debug, Clone, Copy)]
struct Argument {
    value: f64,
    /// Unit as serialized; empty for plain numbers.
    is_angle: bool,
}

fn collect_arguments(args: &mut Parser<'_, '_>) -> Option<Vec<Argument>> {
    let mut collected = Vec::new();
    while let Ok(token) = args.next() {
        match token {
            Token::Number { value, .. } => collected.push(Argument {
                value: f64::from(*value),
                is_angle: false,
            }),
            Token::Dimension { value, unit, .. } => {
                let value = f64::from(*value);
                match unit.to_ascii_lowercase().as_str() {
                    "px" => collected.push(Argument {
                        value,
                        is_angle: false,
                    }),
                    "deg" => collected.push(Argument {
                        value: value.to_radians(),
                        is_angle: true,
                    }),
                    "rad" => collected.push(Argument {
                        value,
                        is_angle: true,
                    }),
                    "grad" => collected.push(Argument {
                        value: (value * 0.9).to_radians(),
                        is_angle: true,
                    }),
                    "turn" => collected.push(Argument {
                        value: value * std::f64::consts::TAU,
                        is_angle: true,
                    }),
                    // Relative lengths never appear in computed
                    // transforms; anything else is unsupported.
                    _ => return None,
                }
            }
            Token::Percentage { unit_value, .. } => collected.push(Argument {
                value: f64::from(*unit_value),
                is_angle: false,
            }),
            Token::Comma => {}
            _ => return None,
        }
    }
    Some(collected)
}

fn function_to_matrix(name: &str, arguments: &[Argument]) -> Option<Matrix> {
    let number = |index: usize| arguments.get(index).map(|argument| argument.value);
    Some(match (name, arguments.len()) {
        ("matrix", 6) => [
            number(0)?,
            number(1)?,
            number(2)?,
            number(3)?,
            number(4)?,
            number(5)?,
        ],
        ("matrix3d", 16) => return project_matrix3d(arguments),
        ("translate", 1) => [1.0, 0.0, 0.0, 1.0, number(0)?, 0.0],
        ("translate", 2) => [1.0, 0.0, 0.0, 1.0, number(0)?, number(1)?],
        ("translatex", 1) => [1.0, 0.0, 0.0, 1.0, number(0)?, 0.0],
        ("translatey", 1) => [1.0, 0.0, 0.0, 1.0, 0.0, number(0)?],
        ("scale", 1) => [number(0)?, 0.0, 0.0, number(0)?, 0.0, 0.0],
        ("scale", 2) => [number(0)?, 0.0, 0.0, number(1)?, 0.0, 0.0],
        ("scalex", 1) => [number(0)?, 0.0, 0.0, 1.0, 0.0, 0.0],
        ("scaley", 1) => [1.0, 0.0, 0.0, number(0)?, 0.0, 0.0],
        ("rotate", 1) => {
            let angle = arguments[0];
            if !angle.is_angle && angle.value != 0.0 {
                return None;
            }
            let (sin, cos) = angle.value.sin_cos();
            [cos, sin, -sin, cos, 0.0, 0.0]
        }
        ("skew", 1) => [1.0, 0.0, arguments[0].value.tan(), 1.0, 0.0, 0.0],
        ("skew", 2) => [
            1.0,
            arguments[1].value.tan(),
            arguments[0].value.tan(),
            1.0,
            0.0,
            0.0,
        ],
        ("skewx", 1) => [1.0, 0.0, arguments[0].value.tan(), 1.0, 0.0, 0.0],
        ("skewy", 1) => [1.0, arguments[0].value.tan(), 0.0, 1.0, 0.0, 0.0],
        _ => return None,
    })
}

/// Project a column-major `matrix3d` onto its 2D submatrix. The
/// projection is valid only when the dropped entries carry no
/// information; otherwise the element cannot be mapped and must be
/// rasterized.
fn project_matrix3d(arguments: &[Argument]) -> Option<Matrix> {
    const EPSILON: f64 = 1e-6;
    let entry = |index: usize| arguments[index].value;
    // Column-major order: m11 m12 m13 m14 m21 m22 m23 m24 ...
    let flat_3d = [
        entry(2),  // m13
        entry(3),  // m14
        entry(6),  // m23
        entry(7),  // m24
        entry(8),  // m31
        entry(9),  // m32
        entry(11), // m34
        entry(14), // m43
    ];
    let clean = flat_3d.iter().all(|value| value.abs() < EPSILON)
        && (entry(10) - 1.0).abs() < EPSILON
        && (entry(15) - 1.0).abs() < EPSILON;
    if !clean {
        return None;
    }
    Some([entry(0), entry(1), entry(4), entry(5), entry(12), entry(13)])
}

/// Normalize a computed `transform-origin` ("50% 50%", "20px 10px")
/// to 0..1 box coordinates.
#[must_use]
pub fn parse_transform_origin(value: &str, rect: &LayoutRect) -> Point {
    let mut components = Vec::new();
    let mut input = ParserInput::new(value.trim());
    let mut parser = Parser::new(&mut input);
    while let Ok(token) = parser.next() {
        match token {
            Token::Percentage { unit_value, .. } => components.push(f64::from(*unit_value)),
            Token::Dimension { value, unit, .. } if unit.eq_ignore_ascii_case("px") => {
                components.push(f64::from(*value));
            }
            Token::Number { value, .. } => components.push(f64::from(*value)),
            Token::Ident(keyword) => components.push(match keyword.to_ascii_lowercase().as_str() {
                "left" | "top" => 0.0,
                "center" => 0.5,
                "right" | "bottom" => 1.0,
                _ => 0.5,
            }),
            _ => {}
        }
    }

    let normalize = |raw: Option<&f64>, extent: f64| -> f64 {
        let Some(&value) = raw else { return 0.5 };
        // Values above 1 are pixel offsets; at or below 1 they are
        // already fractions (percentages divide by 100 at parse).
        if value.abs() > 1.0 && extent > 0.0 {
            value / extent
        } else {
            value
        }
    };
    Point::new(
        normalize(components.first(), rect.width),
        normalize(components.get(1), rect.height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_45_degrees_produces_expected_matrix() {
        let TransformOutcome::Affine(matrix) = parse_transform("rotate(45deg)") else {
            panic!("expected affine outcome");
        };
        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert!((matrix[0] - expected).abs() < 1e-4);
        assert!((matrix[1] - expected).abs() < 1e-4);
        assert!((matrix[2] + expected).abs() < 1e-4);
        assert!((matrix[3] - expected).abs() < 1e-4);
    }

    #[test]
    fn computed_matrix_form_parses_directly() {
        let TransformOutcome::Affine(matrix) =
            parse_transform("matrix(1, 0, 0, 1, 10.5, -4)") else {
            panic!("expected affine outcome");
        };
        assert_eq!(matrix[4], 10.5);
        assert_eq!(matrix[5], -4.0);
    }

    #[test]
    fn function_lists_compose_left_to_right() {
        let TransformOutcome::Affine(matrix) =
            parse_transform("translate(10px, 0px) scale(2)") else {
            panic!("expected affine outcome");
        };
        // Point (1, 0) → scale → (2, 0) → translate → (12, 0).
        assert_eq!(matrix, [2.0, 0.0, 0.0, 2.0, 10.0, 0.0]);
    }

    #[test]
    fn flat_matrix3d_projects_and_depth_rotation_degenerates() {
        let flat = "matrix3d(2, 0, 0, 0, 0, 2, 0, 0, 0, 0, 1, 0, 5, 6, 0, 1)";
        assert_eq!(
            parse_transform(flat),
            TransformOutcome::Affine([2.0, 0.0, 0.0, 2.0, 5.0, 6.0])
        );
        // rotateX(90deg) as matrix3d: collapses onto the depth axis.
        let depth = "matrix3d(1, 0, 0, 0, 0, 0, 1, 0, 0, -1, 0, 0, 0, 0, 0, 1)";
        assert_eq!(parse_transform(depth), TransformOutcome::Degenerate);
    }

    #[test]
    fn none_and_identity_are_skipped() {
        assert_eq!(parse_transform("none"), TransformOutcome::Identity);
        assert_eq!(
            parse_transform("matrix(1, 0, 0, 1, 0, 0)"),
            TransformOutcome::Identity
        );
    }

    #[test]
    fn origin_normalizes_percent_and_pixels() {
        let rect = LayoutRect::new(0.0, 0.0, 200.0, 100.0);
        let center = parse_transform_origin("50% 50%", &rect);
        assert_eq!(center, Point::new(0.5, 0.5));
        let pixel = parse_transform_origin("100px 25px", &rect);
        assert_eq!(pixel, Point::new(0.5, 0.25));
    }
}
