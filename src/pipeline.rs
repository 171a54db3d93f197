//! Export Pipeline - Single Entry Point
//!
//! Idle -> ComputingBBox -> BuildingClones -> InliningAssets -> Rasterizing
//!      -> Compositing -> Encoding -> (Invoking) -> Done | Failed
//!
//! CRITICAL: the primary raster is delivered before the model server is
//! contacted. Nothing that happens during invocation can fail the export.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::assets::{inline_assets, AssetFetcher, InlineSummary, ResourceFetcher};
use crate::bounds::compute_content_bbox;
use crate::clone::{build_clone, CloneSpec};
use crate::composite::{composite, CompositeError};
use crate::config::ExportConfig;
use crate::document::{SceneDocument, SceneError};
use crate::geometry::{square_viewport, Viewport};
use crate::hashing::{compute_manifest_hash, sha256_hex};
use crate::inference::{HttpTransport, InferenceClient, InferenceError, InferenceResult, InferenceTransport};
use crate::meta::ExportMeta;
use crate::raster::{encode_png, no_fonts, rasterize, system_fonts, FontDb, RasterError};
use crate::snapshot::SceneSnapshot;
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No floor plan found.")]
    MissingScene,

    #[error("Invalid floor plan: {0}")]
    Scene(#[from] SceneError),

    #[error("Rasterization failed: {0}")]
    Raster(#[from] RasterError),

    #[error("Rasterization task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Compositing failed: {0}")]
    Composite(#[from] CompositeError),

    #[error("Failed to deliver {filename}: {source}")]
    Delivery { filename: String, source: io::Error },

    #[error("Client setup failed: {0}")]
    Client(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<InferenceError> for ExportError {
    fn from(e: InferenceError) -> Self {
        ExportError::Client(e.to_string())
    }
}

impl From<reqwest::Error> for ExportError {
    fn from(e: reqwest::Error) -> Self {
        ExportError::Client(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Idle,
    ComputingBBox,
    BuildingClones,
    InliningAssets,
    Rasterizing,
    Compositing,
    Encoding,
    Invoking,
    Done,
    Failed,
}

/// A file handed to the host for download.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Where progress, notices and downloads go. Keeps the pipeline free of
/// any presentation layer.
pub trait ExportSink {
    fn stage(&mut self, _stage: ExportStage) {}
    fn notice(&mut self, message: &str);
    fn deliver(&mut self, artifact: &Artifact) -> io::Result<()>;
}

/// Writes artifacts into a directory.
pub struct DirectorySink {
    dir: PathBuf,
    delivered: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, delivered: vec![] })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn delivered(&self) -> &[PathBuf] {
        &self.delivered
    }
}

impl ExportSink for DirectorySink {
    fn stage(&mut self, stage: ExportStage) {
        log::debug!("stage {:?}", stage);
    }

    fn notice(&mut self, message: &str) {
        log::info!("{}", message);
    }

    fn deliver(&mut self, artifact: &Artifact) -> io::Result<()> {
        // Server-supplied names must not escape the output directory.
        let name = Path::new(&artifact.filename)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty artifact name"))?;
        let path = self.dir.join(name);
        fs::write(&path, &artifact.bytes)?;
        self.delivered.push(path);
        Ok(())
    }
}

/// Input of one export run. `scene` is `None` when the host has no
/// floor plan root.
#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    pub scene: Option<&'a SceneDocument>,
    pub units_per_meter: f64,
    pub snapshot: Option<&'a SceneSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub filename: String,
    pub format: String,
    pub size: [u32; 2],
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InferenceOutcome {
    Skipped,
    Delivered { kind: String, filename: String },
    Json { payload: Value },
    Failed { status: Option<u16>, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReport {
    pub full: InlineSummary,
    pub wall_mask: InlineSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub id: String,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    pub viewport: Viewport,
    pub floorplan: ExportedFile,
    pub assets: AssetReport,
    pub meta: ExportMeta,
    pub inference: InferenceOutcome,
    pub manifest_hash: String,
}

/// The export pipeline - one call per user-triggered export.
///
/// Runs are independent; hosts keep their own busy flag so a second
/// export is not started while one is in flight.
pub struct ExportPipeline<F = ResourceFetcher, T = HttpTransport> {
    config: ExportConfig,
    fetcher: F,
    client: InferenceClient<T>,
    fonts: FontDb,
}

impl ExportPipeline {
    /// Pipeline with the file/HTTP fetcher rooted at `asset_dir` and the
    /// HTTP model transport.
    pub fn new(config: ExportConfig, asset_dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let fetcher = ResourceFetcher::new(asset_dir, config.inference.timeout())?;
        let transport = HttpTransport::new(config.inference.timeout())?;
        Ok(Self::with_parts(config, fetcher, transport).with_fonts(system_fonts()))
    }
}

impl<F: AssetFetcher, T: InferenceTransport> ExportPipeline<F, T> {
    /// Starts without fonts; text that survives sanitizing is not drawn.
    pub fn with_parts(config: ExportConfig, fetcher: F, transport: T) -> Self {
        let client = InferenceClient::new(config.inference.clone(), transport);
        Self { config, fetcher, client, fonts: no_fonts() }
    }

    pub fn with_fonts(mut self, fonts: FontDb) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn client(&self) -> &InferenceClient<T> {
        &self.client
    }

    /// Runs one export. The primary raster is either delivered in full
    /// or the call fails; the inference step only shows up in the report.
    pub async fn export(
        &self,
        request: &ExportRequest<'_>,
        sink: &mut dyn ExportSink,
    ) -> Result<ExportReport, ExportError> {
        sink.stage(ExportStage::Idle);
        let result = self.run(request, sink).await;
        match &result {
            Ok(report) => {
                log::info!("export {} done", report.id);
                sink.stage(ExportStage::Done);
            }
            Err(e) => {
                log::error!("export failed: {}", e);
                sink.notice(&e.to_string());
                sink.stage(ExportStage::Failed);
            }
        }
        result
    }

    async fn run(
        &self,
        request: &ExportRequest<'_>,
        sink: &mut dyn ExportSink,
    ) -> Result<ExportReport, ExportError> {
        let scene = request.scene.ok_or(ExportError::MissingScene)?;
        let cfg = &self.config;
        let size_px = cfg.export_px;

        sink.stage(ExportStage::ComputingBBox);
        let bbox = compute_content_bbox(scene, &cfg.layers.content());
        let viewport = square_viewport(bbox, cfg.padding);
        log::info!("content {:?} -> viewport {:?}", bbox, viewport);

        sink.stage(ExportStage::BuildingClones);
        let mut full = build_clone(scene, viewport, &CloneSpec::full(cfg.full_background.as_str()), &cfg.layers);
        let mut mask = build_clone(scene, viewport, &CloneSpec::wall_mask(cfg.mask_background.as_str()), &cfg.layers);

        sink.stage(ExportStage::InliningAssets);
        let (full_assets, mask_assets) = tokio::join!(
            inline_assets(&mut full, &self.fetcher),
            inline_assets(&mut mask, &self.fetcher),
        );

        sink.stage(ExportStage::Rasterizing);
        let full_markup = full.to_markup();
        let mask_markup = mask.to_markup();
        let (full_fonts, mask_fonts) = (self.fonts.clone(), self.fonts.clone());
        let (full_raster, mask_raster) = tokio::try_join!(
            tokio::task::spawn_blocking(move || rasterize(&full_markup, size_px, full_fonts)),
            tokio::task::spawn_blocking(move || rasterize(&mask_markup, size_px, mask_fonts)),
        )?;
        let (full_raster, mask_raster) = (full_raster?, mask_raster?);

        sink.stage(ExportStage::Compositing);
        let canonical = composite(&full_raster, &mask_raster)?;

        sink.stage(ExportStage::Encoding);
        let floorplan_png = encode_png(&canonical)?;
        let filename = format!("floorplan_{}.png", size_px);
        let artifact = Artifact {
            filename: filename.clone(),
            media_type: "image/png".to_string(),
            bytes: floorplan_png,
        };
        sink.deliver(&artifact)
            .map_err(|source| ExportError::Delivery { filename: filename.clone(), source })?;
        sink.notice(&format!("Exported {}", filename));

        let floorplan = ExportedFile {
            filename,
            format: "png".to_string(),
            size: [size_px, size_px],
            hash: sha256_hex(&artifact.bytes),
        };

        let meta = ExportMeta::build(size_px, viewport, request.units_per_meter);
        let inference = self
            .invoke(&artifact.bytes, &mask_raster, &meta, request.snapshot, sink)
            .await;

        let mut report = ExportReport {
            id: Uuid::new_v4().to_string(),
            engine_version: ENGINE_VERSION.to_string(),
            created_at: meta.created_at,
            viewport,
            floorplan,
            assets: AssetReport { full: full_assets, wall_mask: mask_assets },
            meta,
            inference,
            manifest_hash: String::new(), // Computed after
        };
        report.manifest_hash = compute_manifest_hash(&report)?;
        Ok(report)
    }

    /// Optional model call. Every failure is folded into the outcome.
    async fn invoke(
        &self,
        floorplan_png: &[u8],
        mask_raster: &RgbaImage,
        meta: &ExportMeta,
        snapshot: Option<&SceneSnapshot>,
        sink: &mut dyn ExportSink,
    ) -> InferenceOutcome {
        let wall_mask_png = if self.client.config().enabled {
            sink.stage(ExportStage::Invoking);
            match encode_png(mask_raster) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    log::warn!("wall mask not attached: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let result = self
            .client
            .run(floorplan_png, wall_mask_png.as_deref(), meta, snapshot)
            .await;

        match result {
            Ok(InferenceResult::Skipped) => InferenceOutcome::Skipped,
            Ok(InferenceResult::Json { payload }) => {
                sink.notice("Model server returned JSON");
                InferenceOutcome::Json { payload }
            }
            Ok(InferenceResult::Zip { blob, filename }) => {
                deliver_output(sink, "zip", "application/zip", blob, filename)
            }
            Ok(InferenceResult::Binary { blob, filename }) => {
                deliver_output(sink, "file", "application/octet-stream", blob, filename)
            }
            Err(e) => {
                log::warn!("model call failed: {}", e);
                sink.notice(&format!("Model call failed: {}", e));
                InferenceOutcome::Failed { status: e.status(), message: e.to_string() }
            }
        }
    }
}

fn deliver_output(
    sink: &mut dyn ExportSink,
    kind: &str,
    media_type: &str,
    bytes: Vec<u8>,
    filename: String,
) -> InferenceOutcome {
    let artifact = Artifact { filename: filename.clone(), media_type: media_type.to_string(), bytes };
    match sink.deliver(&artifact) {
        Ok(()) => {
            sink.notice(&format!("Model outputs saved as {}", filename));
            InferenceOutcome::Delivered { kind: kind.to_string(), filename }
        }
        Err(e) => {
            let message = format!("Failed to deliver {}: {}", filename, e);
            sink.notice(&message);
            InferenceOutcome::Failed { status: None, message }
        }
    }
}
