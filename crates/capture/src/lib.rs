//! Capture agent: turns a rendered page (behind the `PageHost` seam)
//! into a `SceneSchema`. Phases run in a fixed order — stabilize,
//! traverse, acquire assets, rasterize, assemble — with cooperative
//! cancellation at every suspension point and an outer budget that
//! degrades to a partial schema marked incomplete.

pub mod assemble;
pub mod assets;
pub mod components;
pub mod config;
pub mod fixture;
pub mod host;
pub mod messaging;
pub mod raster;
pub mod resolve;
pub mod stabilize;
pub mod tokens;
pub mod traverse;
pub mod variants;

pub use config::{CancelFlag, CaptureConfig, CaptureOptions, ProgressEvent, ViewportRequest};
pub use host::{ChildEntry, DocumentInfo, ForcedState, FrameContent, PageHost, PseudoKind};

use log::info;
use scene::envelope::{CaptureEntry, MultiViewportEnvelope};
use scene::{Result, SceneSchema};
use std::collections::HashMap;
use std::time::Instant;
use tracing::info_span;

/// Capture the page at its current viewport.
///
/// # Errors
/// Surfaces `RestrictedDocument`, `StabilizationTimeout`, and
/// `Canceled`; asset and raster failures degrade per node instead of
/// failing the capture.
pub async fn capture<H: PageHost>(
    host: &H,
    options: &CaptureOptions,
    config: &CaptureConfig,
    cancel: &CancelFlag,
    progress: &mut dyn FnMut(ProgressEvent),
) -> Result<SceneSchema> {
    let span = info_span!("capture", url = %host.document_info().url);
    let _guard = span.enter();
    let started = Instant::now();
    let deadline = config.capture_budget();

    progress(ProgressEvent::new("stabilize", "preparing page", 5));
    let mark = stabilize::stabilize(host, options, config, cancel).await?;
    info!(
        "page stable after {} sweep step(s) in {} ms",
        mark.sweep_steps, mark.elapsed_ms
    );

    progress(ProgressEvent::new("traverse", "walking element tree", 25));
    let traversal = traverse::traverse(host, config, cancel)?;
    let node_count = traversal
        .root
        .as_ref()
        .map_or(0, scene::AnalyzedNode::subtree_len);
    info!(
        "traversal produced {node_count} node(s), {} asset request(s), {} raster request(s)",
        traversal.assets.len(),
        traversal.rasters.len()
    );

    let mut incomplete = false;
    let acquired = if options.include_assets && started.elapsed() < deadline {
        progress(ProgressEvent::new("assets", "acquiring assets", 55));
        assets::acquire_assets(host, traversal.assets, &traversal.text_styles, config, cancel)
            .await?
    } else {
        incomplete = incomplete || options.include_assets;
        assets::AcquiredAssets::default()
    };

    let raster_outcomes = if started.elapsed() < deadline {
        progress(ProgressEvent::new("raster", "capturing fallbacks", 75));
        raster::rasterize_nodes(host, traversal.rasters, config, cancel).await?
    } else {
        incomplete = true;
        HashMap::new()
    };

    if started.elapsed() >= deadline {
        incomplete = true;
    }

    progress(ProgressEvent::new("assemble", "building schema", 90));
    let mut schema = assemble::assemble(
        host,
        traversal.root,
        acquired,
        &raster_outcomes,
        options,
        config,
        incomplete,
    );

    if options.capture_hover_states || options.capture_focus_states {
        let registry = variants::capture_variants(host, &traversal.interactive, options);
        if !registry.is_empty() {
            schema.variants = Some(registry);
        }
    }
    let custom_properties = host.custom_properties();
    if !custom_properties.is_empty() {
        let registry = tokens::lift_tokens(&custom_properties);
        if !registry.variables.is_empty() {
            schema.tokens = Some(registry);
        }
    }

    progress(ProgressEvent::new("done", "capture complete", 100));
    Ok(schema)
}

/// Capture every requested viewport, reapplying the page viewport for
/// each. With no explicit viewports the current one is captured.
///
/// # Errors
/// Same surface as [`capture`].
pub async fn capture_all<H: PageHost>(
    host: &H,
    options: &CaptureOptions,
    config: &CaptureConfig,
    cancel: &CancelFlag,
    progress: &mut dyn FnMut(ProgressEvent),
) -> Result<Vec<SceneSchema>> {
    if options.viewports.is_empty() {
        return Ok(vec![capture(host, options, config, cancel, progress).await?]);
    }
    let mut schemas = Vec::with_capacity(options.viewports.len());
    for viewport in &options.viewports {
        cancel.check()?;
        info!(
            "capturing viewport {} ({}x{})",
            viewport.name, viewport.width, viewport.height
        );
        host.set_viewport(
            viewport.width,
            viewport.height,
            viewport.device_scale_factor,
        )
        .await;
        schemas.push(capture(host, options, config, cancel, progress).await?);
    }
    Ok(schemas)
}

/// Serialize captures for submission: a bare schema for one viewport,
/// the multi-viewport envelope otherwise.
///
/// # Errors
/// `IncompleteTransfer` if serialization fails.
pub fn submission_json(mut schemas: Vec<SceneSchema>) -> Result<String> {
    let serialized = if schemas.len() == 1 {
        serde_json::to_string(&schemas.remove(0))
    } else {
        serde_json::to_string(&MultiViewportEnvelope {
            multi_viewport: true,
            captures: schemas
                .into_iter()
                .map(|schema| CaptureEntry { data: schema })
                .collect(),
        })
    };
    serialized.map_err(|err| scene::Error::IncompleteTransfer(format!("serialize failed: {err}")))
}
