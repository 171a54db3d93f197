//! Floor Plan Export Core - Canonical Raster Export for Floor Plan Editors
//!
//! # Guarantees
//! 1. The live scene is never mutated; every render works on a clone
//! 2. Export viewports are square and centered on the drawn content
//! 3. Rasterization never fetches anything: images are inlined first
//! 4. Walls are pure black in the delivered raster
//! 5. The primary raster is delivered before the model server is called
//! 6. Inference failures never fail an export

pub mod geometry;
pub mod document;
pub mod bounds;
pub mod clone;
pub mod assets;
pub mod raster;
pub mod composite;
pub mod meta;
pub mod snapshot;
pub mod inference;
pub mod pipeline;
pub mod config;
pub mod hashing;
pub mod logging;

pub use geometry::{Rect, Viewport, square_viewport, union_bbox};
pub use document::{SceneDocument, SceneError};
pub use bounds::compute_content_bbox;
pub use clone::{build_clone, CloneSpec, RenderPurpose, SanitizedScene};
pub use assets::{inline_assets, AssetFetcher, InlineSummary, ResourceFetcher};
pub use raster::{rasterize, encode_png, decode_png, RasterError};
pub use composite::{composite, CompositeError};
pub use meta::ExportMeta;
pub use snapshot::SceneSnapshot;
pub use inference::{InferenceClient, InferenceError, InferenceResult, InferenceTransport, HttpTransport};
pub use pipeline::{
    Artifact, DirectorySink, ExportError, ExportPipeline, ExportReport, ExportRequest,
    ExportSink, ExportStage, InferenceOutcome,
};
pub use config::{ExportConfig, InferenceConfig, LayerIds};
pub use hashing::{compute_manifest_hash, canonical_json, sha256_hex};
pub use logging::{init_logging, LoggingConfig};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
