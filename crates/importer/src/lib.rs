//! Importer: reconstruct a `SceneSchema` as native design-tool nodes
//! through the `DesignHost` seam. Per-node failures are caught at the
//! node boundary and recorded; the import continues with the next
//! sibling (partial-success semantics).

pub mod builder;
pub mod dedupe;
pub mod fonts;
pub mod host;
pub mod images;
pub mod recording;
pub mod stats;

pub use host::{DesignHost, HostPaint, ImageAdjustments, SharedStyleKind, TargetKind};
pub use recording::{RecordedKind, RecordedNode, RecordingHost};
pub use stats::{FailedNode, ImportReport, ImportStats};

use builder::BuildContext;
use dedupe::StyleBinder;
use fonts::FontCache;
use images::ImageCache;
use log::{info, warn};
use scene::schema::version_compatible;
use scene::{CoordinateSystem, Error, LayoutRect, Result, SceneSchema};
use tracing::info_span;

/// Horizontal gutter between viewport frames on the imported page.
const VIEWPORT_GUTTER: f64 = 100.0;

/// Import one schema onto a fresh page.
///
/// # Errors
/// `IncompatibleSchema` on a version mismatch; host failures that
/// prevent page or root creation. Per-node failures are recorded in
/// the returned stats instead.
pub async fn import<H: DesignHost>(schema: &SceneSchema, host: &mut H) -> Result<ImportReport> {
    import_schemas(std::slice::from_ref(schema), host).await
}

/// Import a delivered payload: one schema or a multi-viewport
/// envelope. Each capture becomes one top-level frame on the same
/// page.
///
/// # Errors
/// `IncompatibleSchema` when the payload parses as neither shape.
pub async fn import_payload<H: DesignHost>(payload: &str, host: &mut H) -> Result<ImportReport> {
    let schemas = scene::envelope::parse_delivered(payload)?;
    import_schemas(&schemas, host).await
}

/// Import any number of captures onto one page.
///
/// # Errors
/// See [`import`].
pub async fn import_schemas<H: DesignHost>(
    schemas: &[SceneSchema],
    host: &mut H,
) -> Result<ImportReport> {
    let span = info_span!("import", captures = schemas.len());
    let _guard = span.enter();

    // Version gate before any work.
    for schema in schemas {
        if !version_compatible(&schema.version) {
            return Err(Error::IncompatibleSchema {
                found: schema.version.clone(),
                supported: scene::SCHEMA_VERSION.to_owned(),
            });
        }
    }

    let page_name = schemas
        .first()
        .map_or_else(|| "Imported capture".to_owned(), |schema| {
            if schema.metadata.title.is_empty() {
                schema.metadata.url.clone()
            } else {
                schema.metadata.title.clone()
            }
        });
    let page = host.create_page(&page_name)?;

    let mut stats = ImportStats::default();
    let mut offset_x = 0.0;

    for schema in schemas {
        for violation in scene::validate(schema) {
            warn!("schema invariant violated on receipt: {violation}");
        }
        stats.total_nodes += schema.node_count();

        // Fonts and images load before any node is built.
        let mut fonts = FontCache::new();
        fonts.preload(host, schema).await;
        let mut images = ImageCache::new();
        images.preload(host, schema).await;
        let mut binder = StyleBinder::new();
        binder.prepare(host, schema)?;

        let scale = rescale_divisor(schema);
        let mut context = BuildContext {
            host: &mut *host,
            fonts: &mut fonts,
            images: &images,
            binder: &binder,
            stats: &mut stats,
            scale,
        };

        let page_rect = LayoutRect::default();
        match context
            .build_node(&schema.root, &page, &page_rect, false)
            .await
        {
            Ok(root_ref) => {
                stats.created_nodes += 1;
                // Viewport frames sit side by side on the page.
                host.set_position(&root_ref, offset_x, 0.0)?;
                let width = if scale > 1.0 {
                    schema.root.absolute_layout.width / scale
                } else {
                    schema.root.absolute_layout.width
                };
                offset_x += width + VIEWPORT_GUTTER;
            }
            Err(error) => {
                warn!("root frame failed to build: {error}");
                stats.record_failure(&schema.root.id, &error);
            }
        }
    }

    info!(
        "import finished: {}/{} node(s) created, {} rasterized, {} failed",
        stats.created_nodes,
        stats.total_nodes,
        stats.rasterized_nodes,
        stats.failed_nodes.len()
    );
    Ok(ImportReport {
        page_id: page_name,
        stats,
    })
}

/// Uniform divisor for device-pixel captures.
fn rescale_divisor(schema: &SceneSchema) -> f64 {
    if schema.metadata.capture_coordinate_system == CoordinateSystem::DevicePixels
        && schema.metadata.screenshot_scale > 1.0
    {
        schema.metadata.screenshot_scale
    } else {
        1.0
    }
}
