//! Export Invariant Tests
//!
//! These tests verify the guarantees hosts rely on: the primary raster
//! always lands first, walls are pure black, and the model server can
//! never fail an export.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;

use floorplan_export_core::{
    assets::AssetError,
    compute_manifest_hash, decode_png,
    inference::{InferenceRequest, TransportResponse},
    AssetFetcher, Artifact, ExportConfig, ExportError, ExportPipeline, ExportRequest, ExportSink,
    ExportStage, InferenceError, InferenceOutcome, InferenceTransport, SceneDocument, SceneSnapshot,
};

const SIZE: u32 = 64;

// Content bbox is 0 0 200 200, so the viewport is -60 -60 320 320 and one
// pixel covers 5 scene units.
const PLAN: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" viewBox="-500 -500 2000 2000" style="background:#333">
<g id="boxgrid"><rect x="-1000" y="-1000" width="4000" height="4000" fill="#000000"/></g>
<g id="boxRoom"><rect x="0" y="0" width="200" height="200" fill="#f0d0a0"/></g>
<g id="boxwall"><rect x="0" y="0" width="200" height="40" fill="#7f7f7f" stroke="#222222"/></g>
<g id="boxFurniture"><image xlink:href="chair.svg" x="150" y="150" width="20" height="20"/></g>
<g id="boxText"><text x="100" y="100">Kitchen</text></g>
</svg>"##;

const CHAIR: &[u8] = br##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10" fill="#3060c0"/></svg>"##;

struct MockFetcher {
    files: HashMap<String, Vec<u8>>,
}

impl AssetFetcher for MockFetcher {
    async fn fetch(&self, href: &str) -> Result<Vec<u8>, AssetError> {
        self.files.get(href).cloned().ok_or_else(|| AssetError::Fetch {
            href: href.to_string(),
            message: "not found".into(),
        })
    }
}

struct MockTransport {
    response: TransportResponse,
    calls: Cell<usize>,
    last: RefCell<Option<InferenceRequest>>,
}

impl MockTransport {
    fn new(status: u16, content_type: &str, disposition: Option<&str>, body: &[u8]) -> Self {
        Self {
            response: TransportResponse {
                status,
                content_type: Some(content_type.to_string()),
                content_disposition: disposition.map(str::to_string),
                body: body.to_vec(),
            },
            calls: Cell::new(0),
            last: RefCell::new(None),
        }
    }
}

impl InferenceTransport for MockTransport {
    async fn post_multipart(
        &self,
        _endpoint: &str,
        request: InferenceRequest,
    ) -> Result<TransportResponse, InferenceError> {
        self.calls.set(self.calls.get() + 1);
        *self.last.borrow_mut() = Some(request);
        Ok(self.response.clone())
    }
}

#[derive(Default)]
struct RecordingSink {
    stages: Vec<ExportStage>,
    notices: Vec<String>,
    artifacts: Vec<Artifact>,
    refuse: bool,
}

impl ExportSink for RecordingSink {
    fn stage(&mut self, stage: ExportStage) {
        self.stages.push(stage);
    }

    fn notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }

    fn deliver(&mut self, artifact: &Artifact) -> io::Result<()> {
        if self.refuse {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.artifacts.push(artifact.clone());
        Ok(())
    }
}

fn config(enabled: bool) -> ExportConfig {
    let mut config = ExportConfig { export_px: SIZE, ..Default::default() };
    config.inference.enabled = enabled;
    config
}

fn create_pipeline(enabled: bool, transport: MockTransport) -> ExportPipeline<MockFetcher, MockTransport> {
    let fetcher = MockFetcher {
        files: [("chair.svg".to_string(), CHAIR.to_vec())].into_iter().collect(),
    };
    ExportPipeline::with_parts(config(enabled), fetcher, transport)
}

fn zip_transport() -> MockTransport {
    MockTransport::new(200, "application/zip", Some(r#"attachment; filename="pano.zip""#), b"PK\x03\x04")
}

#[tokio::test]
async fn invariant_full_export_delivers_raster_then_outputs() {
    let scene = SceneDocument::parse(PLAN).unwrap();
    let before = scene.to_markup();
    let pipeline = create_pipeline(true, zip_transport());
    let mut sink = RecordingSink::default();

    let request = ExportRequest { scene: Some(&scene), units_per_meter: 60.0, snapshot: None };
    let report = pipeline.export(&request, &mut sink).await.unwrap();

    // The live scene is never touched
    assert_eq!(scene.to_markup(), before);

    let names: Vec<_> = sink.artifacts.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, vec!["floorplan_64.png", "pano.zip"]);
    assert_eq!(
        report.inference,
        InferenceOutcome::Delivered { kind: "zip".into(), filename: "pano.zip".into() }
    );

    assert_eq!(report.viewport.w, report.viewport.h);
    assert!((report.viewport.x + 60.0).abs() < 0.5);
    assert!((report.viewport.w - 320.0).abs() < 0.5);
    assert_eq!(report.assets.full.embedded, 1);
    assert_eq!(report.assets.wall_mask.embedded, 0);
    assert_eq!(report.meta.export.size_px, SIZE);

    assert_eq!(sink.stages.first(), Some(&ExportStage::Idle));
    assert!(sink.stages.contains(&ExportStage::Invoking));
    assert_eq!(sink.stages.last(), Some(&ExportStage::Done));
}

#[tokio::test]
async fn invariant_walls_are_pure_black() {
    let scene = SceneDocument::parse(PLAN).unwrap();
    let pipeline = create_pipeline(false, zip_transport());
    let mut sink = RecordingSink::default();

    let request = ExportRequest { scene: Some(&scene), units_per_meter: 60.0, snapshot: None };
    let report = pipeline.export(&request, &mut sink).await.unwrap();

    let png = decode_png(&sink.artifacts[0].bytes).unwrap();
    assert_eq!(png.dimensions(), (SIZE, SIZE));
    assert_eq!(report.floorplan.size, [SIZE, SIZE]);

    // Wall band: scene y 0..40 -> pixel rows 12..20
    assert_eq!(png.get_pixel(32, 16).0, [0, 0, 0, 255]);
    // Room floor keeps its color
    let room = png.get_pixel(32, 40).0;
    assert!(room[0] > 200 && room[2] < 200);
    // Padding shows the configured background, not the grid or page style
    assert_eq!(png.get_pixel(2, 2).0, [240, 240, 240, 255]);
}

#[tokio::test]
async fn invariant_server_error_does_not_fail_export() {
    let scene = SceneDocument::parse(PLAN).unwrap();
    let pipeline = create_pipeline(true, MockTransport::new(500, "text/plain", None, b"boom"));
    let mut sink = RecordingSink::default();

    let request = ExportRequest { scene: Some(&scene), units_per_meter: 60.0, snapshot: None };
    let report = pipeline.export(&request, &mut sink).await.unwrap();

    assert_eq!(sink.artifacts.len(), 1);
    assert_eq!(sink.artifacts[0].filename, "floorplan_64.png");
    match &report.inference {
        InferenceOutcome::Failed { status, message } => {
            assert_eq!(*status, Some(500));
            assert!(message.contains("boom"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(sink.notices.iter().any(|n| n.contains("500")));
    assert_eq!(sink.stages.last(), Some(&ExportStage::Done));
}

#[tokio::test]
async fn invariant_json_response_downloads_nothing() {
    let scene = SceneDocument::parse(PLAN).unwrap();
    let pipeline = create_pipeline(true, MockTransport::new(200, "application/json", None, br#"{"ok":true}"#));
    let mut sink = RecordingSink::default();

    let request = ExportRequest { scene: Some(&scene), units_per_meter: 60.0, snapshot: None };
    let report = pipeline.export(&request, &mut sink).await.unwrap();

    assert_eq!(sink.artifacts.len(), 1);
    assert_eq!(report.inference, InferenceOutcome::Json { payload: serde_json::json!({"ok": true}) });
}

#[tokio::test]
async fn invariant_disabled_inference_makes_no_calls() {
    let scene = SceneDocument::parse(PLAN).unwrap();
    let pipeline = create_pipeline(false, zip_transport());
    let mut sink = RecordingSink::default();

    let request = ExportRequest { scene: Some(&scene), units_per_meter: 60.0, snapshot: None };
    let report = pipeline.export(&request, &mut sink).await.unwrap();

    assert_eq!(report.inference, InferenceOutcome::Skipped);
    assert_eq!(pipeline.client().transport().calls.get(), 0);
    assert!(!sink.stages.contains(&ExportStage::Invoking));
    assert_eq!(sink.artifacts.len(), 1);
}

#[tokio::test]
async fn invariant_missing_scene_fails_without_artifacts() {
    let pipeline = create_pipeline(true, zip_transport());
    let mut sink = RecordingSink::default();

    let request = ExportRequest { scene: None, units_per_meter: 60.0, snapshot: None };
    let result = pipeline.export(&request, &mut sink).await;

    assert!(matches!(result, Err(ExportError::MissingScene)));
    assert!(sink.artifacts.is_empty());
    assert_eq!(sink.notices, vec!["No floor plan found.".to_string()]);
    assert_eq!(sink.stages.last(), Some(&ExportStage::Failed));
    assert_eq!(pipeline.client().transport().calls.get(), 0);
}

#[tokio::test]
async fn invariant_primary_delivery_failure_is_fatal() {
    let scene = SceneDocument::parse(PLAN).unwrap();
    let pipeline = create_pipeline(true, zip_transport());
    let mut sink = RecordingSink { refuse: true, ..Default::default() };

    let request = ExportRequest { scene: Some(&scene), units_per_meter: 60.0, snapshot: None };
    let result = pipeline.export(&request, &mut sink).await;

    assert!(matches!(result, Err(ExportError::Delivery { .. })));
    // The model server is only contacted after the raster is delivered
    assert_eq!(pipeline.client().transport().calls.get(), 0);
}

#[tokio::test]
async fn invariant_request_carries_raster_mask_and_meta() {
    let scene = SceneDocument::parse(PLAN).unwrap();
    let transport = zip_transport();
    let fetcher = MockFetcher { files: HashMap::new() };
    let mut config = config(true);
    config.inference.include_scene = true;
    let pipeline = ExportPipeline::with_parts(config, fetcher, transport);
    let mut sink = RecordingSink::default();

    let snapshot = SceneSnapshot::new(vec![Default::default()], vec![], vec![]);
    let request = ExportRequest { scene: Some(&scene), units_per_meter: 60.0, snapshot: Some(&snapshot) };
    let report = pipeline.export(&request, &mut sink).await.unwrap();

    // Unresolvable furniture image is hidden, not fatal
    assert_eq!(report.assets.full.hidden, 1);

    let last = pipeline.client().transport().last.borrow();
    let sent = last.as_ref().unwrap();
    assert_eq!(sent.floorplan_png, sink.artifacts[0].bytes);
    assert_eq!(sent.floorplan_filename(), "floorplan_64.png");
    assert_eq!(sent.wall_mask_filename(), "wall_mask_64.png");

    let mask = decode_png(sent.wall_mask_png.as_ref().unwrap()).unwrap();
    assert_eq!(mask.get_pixel(32, 16).0, [0, 0, 0, 255]);
    assert_eq!(mask.get_pixel(32, 40).0, [255, 255, 255, 255]);

    let meta: serde_json::Value = serde_json::from_str(&sent.meta_json).unwrap();
    assert_eq!(meta["export"]["sizePx"], 64);
    assert_eq!(meta["export"]["meterUnitsPerMeter"], 60.0);
    assert!(sent.scene_json.as_ref().unwrap().contains("\"walls\":1"));
}

#[tokio::test]
async fn invariant_manifest_hash_matches_report() {
    let scene = SceneDocument::parse(PLAN).unwrap();
    let pipeline = create_pipeline(false, zip_transport());
    let mut sink = RecordingSink::default();

    let request = ExportRequest { scene: Some(&scene), units_per_meter: 60.0, snapshot: None };
    let report = pipeline.export(&request, &mut sink).await.unwrap();

    let mut unhashed = report.clone();
    unhashed.manifest_hash = String::new();
    assert_eq!(compute_manifest_hash(&unhashed).unwrap(), report.manifest_hash);
    assert_eq!(report.floorplan.hash.len(), 64);
}
