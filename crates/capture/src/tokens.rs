//! Design-token lifting: root-level CSS custom properties become a
//! token graph with aliases resolved for `var(--x)` references.

use crate::resolve::color::parse_css_color;
use crate::resolve::shadow::parse_px;
use scene::registry::{DesignToken, DesignTokenRegistry, TokenType};

/// Build a token registry from the page's root custom properties.
#[must_use]
pub fn lift_tokens(custom_properties: &[(String, String)]) -> DesignTokenRegistry {
    let mut registry = DesignTokenRegistry::default();
    for (name, value) in custom_properties {
        let token_id = token_id(name);
        let trimmed = value.trim();

        if let Some(target) = var_reference(trimmed) {
            // Pure alias: `--a: var(--b)`.
            registry.aliases.insert(token_id.clone(), token_id_for(&target));
        }

        let references = collect_references(trimmed);
        registry.variables.insert(
            token_id,
            DesignToken {
                name: name.clone(),
                token_type: classify(trimmed),
                value: trimmed.to_owned(),
                scope: vec![":root".to_owned()],
                collection: "page".to_owned(),
                references,
            },
        );
    }
    registry
}

fn token_id(css_name: &str) -> String {
    format!("token.{}", css_name.trim_start_matches('-').replace('-', "."))
}

fn token_id_for(css_name: &str) -> String {
    token_id(css_name)
}

/// `var(--x)` when the whole value is a single reference.
fn var_reference(value: &str) -> Option<String> {
    let inner = value.strip_prefix("var(")?.strip_suffix(')')?;
    let name = inner.split(',').next()?.trim();
    if name.starts_with("--") && !name.is_empty() {
        Some(name.to_owned())
    } else {
        None
    }
}

/// Every `--name` mentioned inside `var()` calls anywhere in the
/// value.
fn collect_references(value: &str) -> Vec<String> {
    let mut references = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find("var(") {
        rest = &rest[start + 4..];
        let end = rest.find([',', ')']).unwrap_or(rest.len());
        let name = rest[..end].trim();
        if name.starts_with("--") {
            references.push(token_id_for(name));
        }
    }
    references
}

fn classify(value: &str) -> TokenType {
    if parse_css_color(value).is_some() {
        TokenType::Color
    } else if parse_px(value).is_some() || value.parse::<f64>().is_ok() {
        TokenType::Number
    } else {
        TokenType::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_numbers_and_strings_classify() {
        let registry = lift_tokens(&[
            ("--brand".to_owned(), "rgb(10, 20, 30)".to_owned()),
            ("--gap".to_owned(), "16px".to_owned()),
            ("--font-stack".to_owned(), "Inter, sans-serif".to_owned()),
        ]);
        assert_eq!(registry.variables.len(), 3);
        assert_eq!(
            registry.variables["token.brand"].token_type,
            TokenType::Color
        );
        assert_eq!(registry.variables["token.gap"].token_type, TokenType::Number);
        assert_eq!(
            registry.variables["token.font.stack"].token_type,
            TokenType::String
        );
    }

    #[test]
    fn aliases_resolve_var_references() {
        let registry = lift_tokens(&[
            ("--brand".to_owned(), "rgb(10, 20, 30)".to_owned()),
            ("--accent".to_owned(), "var(--brand)".to_owned()),
        ]);
        assert_eq!(
            registry.aliases.get("token.accent"),
            Some(&"token.brand".to_owned())
        );
        assert_eq!(
            registry.variables["token.accent"].references,
            vec!["token.brand"]
        );
    }
}
