//! Capture agent configuration: option flags chosen per capture and
//! budget/timeout tuning loaded once from the environment.

use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One requested capture viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportRequest {
    pub name: String,
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_scale_factor")]
    pub device_scale_factor: f64,
}

const fn default_scale_factor() -> f64 {
    1.0
}

/// Per-capture options accepted by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureOptions {
    /// Extra viewports to capture; empty means the page's current one.
    pub viewports: Vec<ViewportRequest>,
    pub capture_hover_states: bool,
    pub capture_focus_states: bool,
    pub detect_components: bool,
    pub include_assets: bool,
    pub scroll_sweep: bool,
    pub reduced_motion: bool,
    pub disable_animations: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            viewports: Vec::new(),
            capture_hover_states: false,
            capture_focus_states: false,
            detect_components: false,
            include_assets: true,
            scroll_sweep: true,
            reduced_motion: true,
            disable_animations: true,
        }
    }
}

/// Budget tuning for the capture agent.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Overall stabilization budget in milliseconds.
    pub stabilize_budget_ms: u64,
    /// Quiescence window required per scroll step, milliseconds.
    pub quiescence_window_ms: u64,
    /// Outer timeout for the whole capture, milliseconds. On expiry a
    /// partial schema marked incomplete is emitted.
    pub capture_budget_ms: u64,
    /// Probe timeout for data-URL image sources, milliseconds.
    pub probe_data_url_timeout_ms: u64,
    /// Probe timeout for remote image sources, milliseconds.
    pub probe_remote_timeout_ms: u64,
    /// Bounded concurrency for asset acquisition.
    pub asset_concurrency: usize,
    /// Maximum same-origin iframe/shadow descent depth.
    pub max_frame_depth: usize,
    /// Tolerance when validating raster capture dimensions, pixels.
    pub raster_dimension_tolerance: f64,
    /// Minimum repeat count before a style is promoted to the shared
    /// registry.
    pub style_promotion_threshold: u32,
    /// Minimum repeat count before a subtree signature becomes a
    /// component definition.
    pub component_threshold: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stabilize_budget_ms: 10_000,
            quiescence_window_ms: 500,
            capture_budget_ms: 90_000,
            probe_data_url_timeout_ms: 1_500,
            probe_remote_timeout_ms: 4_000,
            asset_concurrency: 6,
            max_frame_depth: 3,
            raster_dimension_tolerance: 2.0,
            style_promotion_threshold: 2,
            component_threshold: 2,
        }
    }
}

impl CaptureConfig {
    /// Load configuration from `PAGELIFT_*` environment variables,
    /// falling back to defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stabilize_budget_ms: env_u64("PAGELIFT_STABILIZE_BUDGET_MS")
                .unwrap_or(defaults.stabilize_budget_ms),
            quiescence_window_ms: env_u64("PAGELIFT_QUIESCENCE_WINDOW_MS")
                .unwrap_or(defaults.quiescence_window_ms),
            capture_budget_ms: env_u64("PAGELIFT_CAPTURE_BUDGET_MS")
                .unwrap_or(defaults.capture_budget_ms),
            asset_concurrency: env_u64("PAGELIFT_ASSET_CONCURRENCY")
                .map_or(defaults.asset_concurrency, |value| value.max(1) as usize),
            ..defaults
        }
    }

    #[inline]
    #[must_use]
    pub const fn stabilize_budget(&self) -> Duration {
        Duration::from_millis(self.stabilize_budget_ms)
    }

    #[inline]
    #[must_use]
    pub const fn quiescence_window(&self) -> Duration {
        Duration::from_millis(self.quiescence_window_ms)
    }

    #[inline]
    #[must_use]
    pub const fn capture_budget(&self) -> Duration {
        Duration::from_millis(self.capture_budget_ms)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

/// Cooperative cancellation flag checked at every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Error out when the user has canceled.
    ///
    /// # Errors
    /// `Canceled` once the flag is set.
    #[inline]
    pub fn check(&self) -> scene::Result<()> {
        if self.is_canceled() {
            Err(scene::Error::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Advisory progress event emitted cooperatively during capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: String,
    pub message: String,
    /// 0..100.
    pub percent: u8,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(phase: &str, message: impl Into<String>, percent: u8) -> Self {
        Self {
            phase: phase.to_owned(),
            message: message.into(),
            percent: percent.min(100),
        }
    }
}
