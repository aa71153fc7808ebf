//! Page stabilizer: bring a live page into a deterministic visual
//! state before traversal. Runs at most one scroll sweep, flushes
//! lazy-loaded content through bounded quiescence waits, and holds a
//! navigation guard for its whole duration — capture runs in the same
//! page the user cares about.

use crate::config::{CancelFlag, CaptureConfig, CaptureOptions};
use crate::host::PageHost;
use log::{debug, warn};
use scene::{Error, Result};
use std::time::Instant;

/// Proof token that stabilization ran; carries what was observed.
#[derive(Debug, Clone)]
pub struct StableMark {
    /// Scroll steps performed during the sweep (0 when disabled).
    pub sweep_steps: u32,
    /// Total stabilization wall time, milliseconds.
    pub elapsed_ms: u64,
    /// True when every quiescence window was reached in budget.
    pub fully_quiescent: bool,
}

/// Stylesheet injected when animations are disabled. Neutralizes
/// transition and animation timing so rects stop moving mid-capture.
const FREEZE_CSS: &str = "*, *::before, *::after { \
     transition-duration: 0s !important; \
     transition-delay: 0s !important; \
     animation-duration: 0s !important; \
     animation-delay: 0s !important; \
     animation-iteration-count: 1 !important; \
     scroll-behavior: auto !important; }";

/// Media-emulation stylesheet for reduced motion.
const REDUCED_MOTION_CSS: &str =
    "@media (prefers-reduced-motion: no-preference) { * { animation-play-state: paused !important; } }";

/// Prepare the page for capture.
///
/// # Errors
/// - `RestrictedDocument` when the host reports a document the agent
///   cannot run in.
/// - `StabilizationTimeout` when a quiescence window cannot be reached
///   within the configured budget.
/// - `Canceled` when the user flag trips at a suspension point.
pub async fn stabilize<H: PageHost>(
    host: &H,
    options: &CaptureOptions,
    config: &CaptureConfig,
    cancel: &CancelFlag,
) -> Result<StableMark> {
    let info = host.document_info();
    if info.restricted {
        return Err(Error::RestrictedDocument(info.url));
    }

    let started = Instant::now();
    host.install_navigation_guard();

    let mut injected = Vec::new();
    if options.disable_animations {
        injected.push(host.inject_stylesheet(FREEZE_CSS));
    }
    if options.reduced_motion {
        injected.push(host.inject_stylesheet(REDUCED_MOTION_CSS));
    }

    let outcome = run_sweep(host, options, config, cancel, started).await;

    for handle in injected {
        host.remove_stylesheet(handle);
    }
    host.remove_navigation_guard();

    let (sweep_steps, fully_quiescent) = outcome?;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    debug!("stabilized after {sweep_steps} sweep steps in {elapsed_ms} ms");
    Ok(StableMark {
        sweep_steps,
        elapsed_ms,
        fully_quiescent,
    })
}

/// One top-to-bottom pass in viewport-sized steps, then scroll
/// restoration. Never navigates.
async fn run_sweep<H: PageHost>(
    host: &H,
    options: &CaptureOptions,
    config: &CaptureConfig,
    cancel: &CancelFlag,
    started: Instant,
) -> Result<(u32, bool)> {
    let budget = config.stabilize_budget();
    let window = config.quiescence_window();

    // Initial quiescence before any scrolling.
    cancel.check()?;
    let mut fully_quiescent = host.await_network_quiescence(window, budget).await;
    if !fully_quiescent && started.elapsed() >= budget {
        return Err(Error::StabilizationTimeout {
            budget_ms: config.stabilize_budget_ms,
        });
    }

    let mut sweep_steps = 0u32;
    if options.scroll_sweep {
        let viewport = host.viewport();
        let step = viewport.height.max(1.0);
        let full_height = viewport.scroll_height.max(viewport.height);
        let mut offset = 0.0;
        while offset < full_height {
            cancel.check()?;
            if started.elapsed() >= budget {
                return Err(Error::StabilizationTimeout {
                    budget_ms: config.stabilize_budget_ms,
                });
            }
            host.scroll_to(offset).await;
            sweep_steps += 1;
            let remaining = budget.saturating_sub(started.elapsed());
            if !host.await_network_quiescence(window, remaining).await {
                warn!("quiescence window missed at scroll offset {offset}");
                fully_quiescent = false;
            }
            offset += step;
        }
        // Return to origin. The host restores via history.replaceState
        // semantics; this must not trigger a navigation.
        host.scroll_to(0.0).await;
    }

    Ok((sweep_steps, fully_quiescent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixturePage;

    #[tokio::test]
    async fn restricted_documents_are_refused() {
        let mut page = FixturePage::blank(800.0, 600.0);
        page.set_restricted(true);
        let err = stabilize(
            &page,
            &CaptureOptions::default(),
            &CaptureConfig::default(),
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "RestrictedDocument");
    }

    #[tokio::test]
    async fn sweep_visits_full_scroll_height() {
        let mut page = FixturePage::blank(800.0, 600.0);
        page.set_scroll_height(1800.0);
        let mark = stabilize(
            &page,
            &CaptureOptions::default(),
            &CaptureConfig::default(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        assert_eq!(mark.sweep_steps, 3);
        assert!(mark.fully_quiescent);
        // Guard must be released and scroll restored.
        assert_eq!(page.scroll_offset(), 0.0);
        assert!(!page.navigation_guard_active());
    }

    #[tokio::test]
    async fn cancellation_is_observed_between_steps() {
        let mut page = FixturePage::blank(800.0, 600.0);
        page.set_scroll_height(120_000.0);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = stabilize(
            &page,
            &CaptureOptions::default(),
            &CaptureConfig::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "Canceled");
    }
}
