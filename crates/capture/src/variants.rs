//! Interactive-state variants: re-resolve each interactive element
//! under a forced pseudo-state and record only what changed.

use crate::config::CaptureOptions;
use crate::host::{ForcedState, PageHost};
use crate::resolve;
use scene::registry::{PseudoState, VariantDelta, VariantRegistry};

/// Capture hover/focus deltas for the collected interactive elements.
pub fn capture_variants<H: PageHost>(
    host: &H,
    interactive: &[(String, H::Element)],
    options: &CaptureOptions,
) -> VariantRegistry {
    let mut registry = VariantRegistry::new();
    let states: Vec<(ForcedState, PseudoState)> = [
        options
            .capture_hover_states
            .then_some((ForcedState::Hover, PseudoState::Hover)),
        options
            .capture_focus_states
            .then_some((ForcedState::Focus, PseudoState::Focus)),
    ]
    .into_iter()
    .flatten()
    .collect();
    if states.is_empty() {
        return registry;
    }

    for (node_id, element) in interactive {
        let rect = host.bounding_rect(element);
        let base_read = |property: &str| host.computed_style(element, property);
        let base = resolve::resolve_from(&base_read, &rect, false);
        let base_text = resolve::text::resolve_text_style(&base_read);

        let mut deltas = Vec::new();
        for (forced, recorded) in &states {
            let forced_read = |property: &str| {
                host.forced_state_style(element, *forced, property)
                    .unwrap_or_else(|| host.computed_style(element, property))
            };
            let variant = resolve::resolve_from(&forced_read, &rect, false);
            let variant_text = resolve::text::resolve_text_style(&forced_read);

            let delta = VariantDelta {
                state: *recorded,
                fills: (variant.fills != base.fills).then(|| variant.fills.clone()),
                strokes: (variant.strokes != base.strokes).then(|| variant.strokes.clone()),
                effects: (variant.effects != base.effects).then(|| variant.effects.clone()),
                opacity: (variant.opacity != base.opacity).then_some(variant.opacity),
                text_style: (variant_text != base_text).then_some(variant_text),
            };
            let changed = delta.fills.is_some()
                || delta.strokes.is_some()
                || delta.effects.is_some()
                || delta.opacity.is_some()
                || delta.text_style.is_some();
            if changed {
                deltas.push(delta);
            }
        }
        if !deltas.is_empty() {
            registry.insert(node_id.clone(), deltas);
        }
    }
    registry
}
