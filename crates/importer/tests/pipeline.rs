//! Build-pipeline tests against the recording design tool.

use importer::{HostPaint, RecordedKind, RecordingHost};
use scene::geometry::AbsoluteTransform;
use scene::node::{NodeType, RasterReason, Rasterize};
use scene::{
    AnalyzedNode, CoordinateSystem, Effect, LayoutRect, Metadata, Paint, Point, Rgba, SceneSchema,
    ViewportInfo,
};

fn viewport(width: f64, height: f64) -> ViewportInfo {
    ViewportInfo {
        width,
        height,
        device_pixel_ratio: 1.0,
        layout_viewport_width: width,
        layout_viewport_height: height,
        scroll_height: height,
    }
}

fn schema_with(children: Vec<AnalyzedNode>) -> SceneSchema {
    let mut root = AnalyzedNode::new("root", NodeType::Frame, "html");
    root.absolute_layout = LayoutRect::new(0.0, 0.0, 800.0, 600.0);
    root.children = children
        .into_iter()
        .map(|mut child| {
            child.parent_id = Some("root".to_owned());
            child
        })
        .collect();
    let metadata = Metadata {
        viewport: viewport(800.0, 600.0),
        screenshot_scale: 1.0,
        ..Metadata::default()
    };
    SceneSchema::new(metadata, root)
}

fn run_import(schemas: &[SceneSchema], host: &mut RecordingHost) -> importer::ImportReport {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime
        .block_on(importer::import_schemas(schemas, host))
        .unwrap()
}

/// A transformed node must come out of the pipeline with its fills and
/// effects applied: applying the matrix must not short-circuit the
/// remaining steps.
#[test]
fn rotated_node_keeps_fills() {
    let mut badge = AnalyzedNode::new("badge", NodeType::Frame, "div");
    badge.name = "badge".to_owned();
    badge.absolute_layout = LayoutRect::new(100.0, 100.0, 40.0, 40.0);
    badge.absolute_transform = Some(AbsoluteTransform {
        matrix: [
            std::f64::consts::FRAC_1_SQRT_2,
            std::f64::consts::FRAC_1_SQRT_2,
            -std::f64::consts::FRAC_1_SQRT_2,
            std::f64::consts::FRAC_1_SQRT_2,
            0.0,
            0.0,
        ],
        origin: Point::new(0.5, 0.5),
    });
    badge.fills = vec![Paint::solid(Rgba::opaque(1.0, 0.0, 0.0))];
    badge.effects = vec![Effect::DropShadow {
        color: Rgba::new(0.0, 0.0, 0.0, 0.3),
        offset: Point::new(0.0, 2.0),
        radius: 4.0,
        spread: 0.0,
        visible: true,
    }];

    let mut host = RecordingHost::new();
    let report = run_import(&[schema_with(vec![badge])], &mut host);
    assert!(report.stats.failed_nodes.is_empty());

    let node = host.find("badge").unwrap();
    assert!(node.relative_transform.is_some(), "transform applied");
    assert!(!node.fills.is_empty(), "fills survived the transform step");
    assert_eq!(node.effects.len(), 1, "effects survived the transform step");
    let rows = node.relative_transform.unwrap();
    assert!((rows[0][0] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
}

#[test]
fn raster_override_replaces_fills_with_one_image_paint() {
    let png = tiny_png(8, 6);
    let mut element = AnalyzedNode::new("filtered", NodeType::Frame, "div");
    element.name = "filtered".to_owned();
    element.absolute_layout = LayoutRect::new(0.0, 0.0, 8.0, 6.0);
    element.fills = vec![Paint::solid(Rgba::opaque(0.0, 1.0, 0.0))];
    element.css_filter = Some("hue-rotate(90deg)".to_owned());
    element.rasterize = Some(Rasterize {
        reason: RasterReason::Filter,
        data_url: Some(scene::envelope::encode_data_url("image/png", &png)),
    });

    let mut host = RecordingHost::new();
    let report = run_import(&[schema_with(vec![element])], &mut host);
    assert_eq!(report.stats.rasterized_nodes, 1);

    let node = host.find("filtered").unwrap();
    assert_eq!(node.fills.len(), 1);
    assert!(matches!(node.fills[0], HostPaint::Image { .. }));
    // The captured bytes were uploaded as a one-off image.
    assert_eq!(host.images.len(), 1);
    assert_eq!(host.images[0], png);
}

#[test]
fn scale_invariance_between_coordinate_systems() {
    let mut css_child = AnalyzedNode::new("box", NodeType::Rectangle, "div");
    css_child.name = "box".to_owned();
    css_child.absolute_layout = LayoutRect::new(40.0, 30.0, 120.0, 80.0);
    css_child.fills = vec![Paint::solid(Rgba::opaque(0.5, 0.5, 0.5))];
    let css_schema = schema_with(vec![css_child]);

    // The same tree in device pixels at 2x.
    let mut device_child = AnalyzedNode::new("box", NodeType::Rectangle, "div");
    device_child.name = "box".to_owned();
    device_child.parent_id = Some("root".to_owned());
    device_child.absolute_layout = LayoutRect::new(80.0, 60.0, 240.0, 160.0);
    device_child.fills = vec![Paint::solid(Rgba::opaque(0.5, 0.5, 0.5))];
    let mut device_root = AnalyzedNode::new("root", NodeType::Frame, "html");
    device_root.absolute_layout = LayoutRect::new(0.0, 0.0, 1600.0, 1200.0);
    device_root.children = vec![device_child];
    let device_schema = SceneSchema::new(
        Metadata {
            viewport: ViewportInfo {
                width: 1600.0,
                height: 1200.0,
                device_pixel_ratio: 2.0,
                layout_viewport_width: 1600.0,
                layout_viewport_height: 1200.0,
                scroll_height: 1200.0,
            },
            capture_coordinate_system: CoordinateSystem::DevicePixels,
            screenshot_scale: 2.0,
            ..Metadata::default()
        },
        device_root,
    );

    let mut css_host = RecordingHost::new();
    run_import(&[css_schema], &mut css_host);
    let mut device_host = RecordingHost::new();
    run_import(&[device_schema], &mut device_host);

    let css_node = css_host.find("box").unwrap();
    let device_node = device_host.find("box").unwrap();
    assert!((css_node.x - device_node.x).abs() <= 1.0);
    assert!((css_node.y - device_node.y).abs() <= 1.0);
    assert!((css_node.width - device_node.width).abs() <= 1.0);
    assert!((css_node.height - device_node.height).abs() <= 1.0);
}

#[test]
fn multi_viewport_import_creates_side_by_side_frames() {
    let mut desktop_root = AnalyzedNode::new("root-a", NodeType::Frame, "html");
    desktop_root.name = "desktop".to_owned();
    desktop_root.absolute_layout = LayoutRect::new(0.0, 0.0, 1440.0, 900.0);
    let desktop = SceneSchema::new(
        Metadata {
            viewport: viewport(1440.0, 900.0),
            screenshot_scale: 1.0,
            ..Metadata::default()
        },
        desktop_root,
    );
    let mut mobile_root = AnalyzedNode::new("root-b", NodeType::Frame, "html");
    mobile_root.name = "mobile".to_owned();
    mobile_root.absolute_layout = LayoutRect::new(0.0, 0.0, 390.0, 844.0);
    let mobile = SceneSchema::new(
        Metadata {
            viewport: viewport(390.0, 844.0),
            screenshot_scale: 1.0,
            ..Metadata::default()
        },
        mobile_root,
    );

    let mut host = RecordingHost::new();
    run_import(&[desktop, mobile], &mut host);

    let page = host
        .nodes
        .iter()
        .find(|node| node.kind == RecordedKind::Page)
        .unwrap();
    let frames = host.children_of(page.id);
    assert_eq!(frames.len(), 2);
    assert_eq!((frames[0].width, frames[0].height), (1440.0, 900.0));
    assert_eq!((frames[1].width, frames[1].height), (390.0, 844.0));
    // Side by side, not stacked.
    assert!(frames[1].x >= frames[0].width);
}

#[test]
fn incompatible_schema_version_is_refused() {
    let mut schema = schema_with(vec![]);
    schema.version = "2.0.0".to_owned();
    let mut host = RecordingHost::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let error = runtime
        .block_on(importer::import_schemas(&[schema], &mut host))
        .unwrap_err();
    assert_eq!(error.kind(), "IncompatibleSchema");
}

#[test]
fn per_node_failures_skip_to_next_sibling() {
    let mut bad = AnalyzedNode::new("bad", NodeType::Rectangle, "div");
    bad.name = "exploding".to_owned();
    bad.absolute_layout = LayoutRect::new(0.0, 0.0, 10.0, 10.0);
    let mut good = AnalyzedNode::new("good", NodeType::Rectangle, "div");
    good.name = "good".to_owned();
    good.absolute_layout = LayoutRect::new(20.0, 0.0, 10.0, 10.0);
    good.fills = vec![Paint::solid(Rgba::opaque(0.0, 0.0, 1.0))];

    let mut host = RecordingHost::new();
    host.fail_node_named("exploding");
    let report = run_import(&[schema_with(vec![bad, good])], &mut host);

    assert_eq!(report.stats.failed_nodes.len(), 1);
    assert_eq!(report.stats.failed_nodes[0].node_id, "bad");
    assert!(host.find("good").is_some());
    assert!(host.find("exploding").is_none());
}

#[test]
fn text_nodes_load_fonts_with_fallback() {
    let mut text = AnalyzedNode::new("headline", NodeType::Text, "#text");
    text.name = "headline".to_owned();
    text.absolute_layout = LayoutRect::new(0.0, 0.0, 300.0, 40.0);
    text.characters = Some("Welcome".to_owned());
    text.text_style = Some(scene::TextStyle {
        font_family: "Missing Display".to_owned(),
        font_fallbacks: vec!["Georgia".to_owned(), "serif".to_owned()],
        font_weight: 700,
        font_style: scene::node::FontStyle::Normal,
        font_size: 32.0,
        line_height: 40.0,
        letter_spacing: 0.0,
        text_decoration: scene::node::TextDecoration::None,
        text_align: scene::node::TextAlign::Left,
        text_case: scene::node::TextCase::Original,
        text_auto_resize: scene::node::TextAutoResize::None,
    });

    let mut host = RecordingHost::new();
    let report = run_import(&[schema_with(vec![text])], &mut host);
    assert!(report.stats.failed_nodes.is_empty());

    let node = host.find("headline").unwrap();
    assert_eq!(node.characters.as_deref(), Some("Welcome"));
    assert_eq!(node.font_family.as_deref(), Some("Georgia"));
    assert!(host
        .loaded_fonts()
        .contains(&("Georgia".to_owned(), "Bold".to_owned())));
}

#[test]
fn auto_layout_children_rely_on_insertion_order() {
    let mut stack = AnalyzedNode::new("stack", NodeType::Frame, "div");
    stack.name = "stack".to_owned();
    stack.absolute_layout = LayoutRect::new(0.0, 0.0, 300.0, 100.0);
    stack.auto_layout = Some(scene::node::AutoLayout {
        mode: scene::node::AutoLayoutMode::Horizontal,
        primary_axis_align_items: scene::node::AxisAlign::Min,
        counter_axis_align_items: scene::node::AxisAlign::Center,
        item_spacing: 8.0,
        padding: scene::node::Padding {
            top: 4.0,
            right: 4.0,
            bottom: 4.0,
            left: 4.0,
        },
    });
    for index in 0..2 {
        let mut item = AnalyzedNode::new(format!("item{index}"), NodeType::Rectangle, "div");
        item.name = format!("item{index}");
        item.parent_id = Some("stack".to_owned());
        item.absolute_layout = LayoutRect::new(4.0 + 50.0 * f64::from(index), 4.0, 40.0, 40.0);
        stack.children.push(item);
    }

    let mut host = RecordingHost::new();
    run_import(&[schema_with(vec![stack])], &mut host);

    let stack_node = host.find("stack").unwrap();
    assert!(stack_node.auto_layout.is_some());
    let first = host.find("item0").unwrap();
    // No absolute position was set under the auto-layout parent.
    assert_eq!((first.x, first.y), (0.0, 0.0));
}

#[test]
fn children_reorder_across_stacking_contexts() {
    let mut low = AnalyzedNode::new("low", NodeType::Rectangle, "div");
    low.name = "low".to_owned();
    low.absolute_layout = LayoutRect::new(0.0, 0.0, 10.0, 10.0);
    low.layout_context.z_index = Some(5);
    let mut high = AnalyzedNode::new("high", NodeType::Rectangle, "div");
    high.name = "high".to_owned();
    high.absolute_layout = LayoutRect::new(0.0, 0.0, 10.0, 10.0);
    high.layout_context.z_index = Some(-2);

    let mut host = RecordingHost::new();
    run_import(&[schema_with(vec![low, high])], &mut host);

    let root = host.find("html").unwrap();
    let children = host.children_of(root.id);
    // The negative z-index child attaches (paints) first.
    assert_eq!(children[0].name, "high");
    assert_eq!(children[1].name, "low");
}

#[test]
fn shared_styles_bind_during_reconstruction() {
    let accent = Paint::solid(Rgba::opaque(0.1, 0.4, 0.9));
    let key = scene::registry::fingerprint::paint(&accent);
    let mut first = AnalyzedNode::new("first", NodeType::Rectangle, "div");
    first.name = "first".to_owned();
    first.absolute_layout = LayoutRect::new(0.0, 0.0, 10.0, 10.0);
    first.fills = vec![accent.clone()];
    let mut second = AnalyzedNode::new("second", NodeType::Rectangle, "div");
    second.name = "second".to_owned();
    second.absolute_layout = LayoutRect::new(20.0, 0.0, 10.0, 10.0);
    second.fills = vec![accent.clone()];

    let mut schema = schema_with(vec![first, second]);
    schema.styles.colors.insert(
        key,
        scene::registry::ColorStyleEntry {
            name: "Accent".to_owned(),
            paint: accent,
            usage_count: 2,
        },
    );

    let mut host = RecordingHost::new();
    run_import(&[schema], &mut host);

    assert_eq!(host.shared_styles.len(), 1);
    assert_eq!(host.find("first").unwrap().bound_styles.len(), 1);
    assert_eq!(host.find("second").unwrap().bound_styles.len(), 1);
}

#[test]
fn image_nodes_resolve_registry_handles() {
    let png = tiny_png(10, 5);
    let hash = "imghash".to_owned();
    let mut image = AnalyzedNode::new("photo", NodeType::Image, "img");
    image.name = "photo".to_owned();
    image.absolute_layout = LayoutRect::new(0.0, 0.0, 200.0, 100.0);
    image.image_hash = Some(hash.clone());
    image.intrinsic_size = Some(scene::IntrinsicSize::new(10.0, 5.0));
    image.aspect_ratio = Some(2.0);
    image.image_fit = Some(scene::ImageFit::Fill);

    let mut schema = schema_with(vec![image]);
    schema.assets.images.insert(
        hash,
        scene::ImageAsset {
            url: None,
            data_url: Some(scene::envelope::encode_data_url("image/png", &png)),
            bytes: None,
            intrinsic_size: scene::IntrinsicSize::new(10.0, 5.0),
            mime_type: "image/png".to_owned(),
            has_alpha: false,
        },
    );

    let mut host = RecordingHost::new();
    run_import(&[schema], &mut host);

    let node = host.find("photo").unwrap();
    assert_eq!((node.width, node.height), (200.0, 100.0));
    assert_eq!(node.fills.len(), 1);
    let HostPaint::Image { scale_mode, .. } = &node.fills[0] else {
        panic!("expected image paint");
    };
    assert_eq!(*scale_mode, scene::ImageFit::Fill);
}

/// Encode a small PNG for raster fixtures.
fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = image::RgbaImage::new(width, height);
    for pixel in pixels.pixels_mut() {
        *pixel = image::Rgba([10, 20, 30, 255]);
    }
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
