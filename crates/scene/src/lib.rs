//! Scene schema: the canonical document shared by the capture agent,
//! the handoff broker, and the importer. This crate is the only
//! contract among the three; everything else communicates by message.

pub mod envelope;
pub mod error;
pub mod geometry;
pub mod node;
pub mod paint;
pub mod registry;
pub mod schema;
pub mod validate;

pub use error::{Error, Result};
pub use geometry::{AbsoluteTransform, LayoutRect, Matrix, Point};
pub use node::{AnalyzedNode, IntrinsicSize, NodeType, RasterReason, Rasterize, TextStyle};
pub use paint::{BlendMode, CornerRadius, Effect, ImageFit, Paint, Rgba, StrokeAlign};
pub use registry::{AssetRegistry, ImageAsset, StyleRegistry};
pub use schema::{CoordinateSystem, Metadata, SCHEMA_VERSION, SceneSchema, ViewportInfo};
pub use validate::{Violation, validate};
