//! Floor Plan Export CLI - Host for the export pipeline
//!
//! Reads an SVG scene, writes artifacts to the output directory and
//! prints the export report as JSON to stdout.
//! Returns non-zero when the primary export fails.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use floorplan_export_core::{
    init_logging, DirectorySink, ExportConfig, ExportError, ExportPipeline, ExportRequest, LoggingConfig,
    SceneDocument, SceneSnapshot,
};

#[derive(Parser)]
#[command(name = "floorplan-export-cli")]
#[command(about = "Floor Plan Export - canonical raster export and model invocation")]
struct Cli {
    /// SVG scene exported from the editor
    #[arg(short, long)]
    scene: PathBuf,

    /// Directory receiving the exported files
    #[arg(short, long)]
    out_dir: PathBuf,

    /// JSON export configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scene units per meter
    #[arg(long, default_value_t = 60.0)]
    units_per_meter: f64,

    /// Structured scene snapshot (JSON)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Base directory for relative image references (defaults to the scene's directory)
    #[arg(long)]
    asset_dir: Option<PathBuf>,

    /// Skip the model server call
    #[arg(long)]
    no_inference: bool,

    /// Attach the scene snapshot to the model request
    #[arg(long)]
    include_scene: bool,

    /// Model server base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Log filter (env_logger syntax)
    #[arg(long)]
    log: Option<String>,
}

fn fail(message: String) -> ExitCode {
    let output = serde_json::json!({ "success": false, "error": message });
    println!("{}", output);
    ExitCode::FAILURE
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(LoggingConfig { env_filter: cli.log.clone(), ..Default::default() });

    let mut config = match &cli.config {
        Some(path) => match ExportConfig::load_from_file(path) {
            Ok(c) => c,
            Err(e) => return fail(format!("Failed to load config: {}", e)),
        },
        None => ExportConfig::default(),
    };
    config.inference = config.inference.with_env_overrides();
    if cli.no_inference {
        config.inference.enabled = false;
    }
    if cli.include_scene {
        config.inference.include_scene = true;
    }
    if let Some(api_base) = cli.api_base {
        config.inference.api_base = api_base;
    }

    let scene = match std::fs::read_to_string(&cli.scene) {
        Ok(markup) => match SceneDocument::parse(&markup) {
            Ok(doc) => doc,
            Err(e) => return fail(ExportError::from(e).to_string()),
        },
        Err(e) => return fail(format!("Failed to read scene: {}", e)),
    };

    let snapshot = match &cli.snapshot {
        Some(path) => {
            let parsed = std::fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|json| SceneSnapshot::from_json(&json).map_err(|e| e.to_string()));
            match parsed {
                Ok(s) => Some(s),
                Err(e) => return fail(format!("Invalid snapshot: {}", e)),
            }
        }
        None => None,
    };

    let asset_dir = cli.asset_dir.clone().unwrap_or_else(|| {
        cli.scene
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let pipeline = match ExportPipeline::new(config, asset_dir) {
        Ok(p) => p,
        Err(e) => return fail(e.to_string()),
    };
    let mut sink = match DirectorySink::new(&cli.out_dir) {
        Ok(s) => s,
        Err(e) => return fail(format!("Failed to create {}: {}", cli.out_dir.display(), e)),
    };
    log::info!("writing artifacts to {}", sink.dir().display());

    let request = ExportRequest {
        scene: Some(&scene),
        units_per_meter: cli.units_per_meter,
        snapshot: snapshot.as_ref(),
    };

    match pipeline.export(&request, &mut sink).await {
        Ok(report) => {
            let output = serde_json::json!({ "success": true, "report": report });
            match serde_json::to_string_pretty(&output) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e.to_string()),
            }
        }
        Err(e) => {
            let output = serde_json::json!({ "success": false, "error": e.to_string() });
            println!("{}", output);
            ExitCode::from(2)
        }
    }
}
