//! Export Configuration - Immutable Values With Defaults
//!
//! Everything has a default; a missing or partial config file never
//! blocks the primary raster export.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    /// Side of the square export raster, in pixels.
    #[serde(default = "default_export_px")]
    pub export_px: u32,
    /// Scene units kept between content and canvas edge.
    #[serde(default = "default_padding")]
    pub padding: f64,
    #[serde(default = "default_full_background")]
    pub full_background: String,
    #[serde(default = "default_mask_background")]
    pub mask_background: String,
    #[serde(default)]
    pub layers: LayerIds,
    #[serde(default)]
    pub inference: InferenceConfig,
}

fn default_export_px() -> u32 { 1024 }
fn default_padding() -> f64 { 60.0 }
fn default_full_background() -> String { "#f0f0f0".to_string() }
fn default_mask_background() -> String { "#ffffff".to_string() }

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_px: default_export_px(),
            padding: default_padding(),
            full_background: default_full_background(),
            mask_background: default_mask_background(),
            layers: LayerIds::default(),
            inference: InferenceConfig::default(),
        }
    }
}

impl ExportConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Ids of the editor's scene layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerIds {
    #[serde(default = "default_room")]
    pub room: String,
    #[serde(default = "default_wall")]
    pub wall: String,
    #[serde(default = "default_carpentry")]
    pub carpentry: String,
    #[serde(default = "default_fixtures")]
    pub fixtures: String,
    #[serde(default = "default_furniture")]
    pub furniture: String,
    #[serde(default = "default_text")]
    pub text: String,
    /// Grid, selection handles, measurement ribbons, debug guides, snap indicators.
    #[serde(default = "default_editor_overlays")]
    pub editor_overlays: Vec<String>,
}

fn default_room() -> String { "boxRoom".to_string() }
fn default_wall() -> String { "boxwall".to_string() }
fn default_carpentry() -> String { "boxcarpentry".to_string() }
fn default_fixtures() -> String { "boxEnergy".to_string() }
fn default_furniture() -> String { "boxFurniture".to_string() }
fn default_text() -> String { "boxText".to_string() }

fn default_editor_overlays() -> Vec<String> {
    ["boxgrid", "boxbind", "boxRib", "boxScale", "boxDebug", "boxSnap"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for LayerIds {
    fn default() -> Self {
        Self {
            room: default_room(),
            wall: default_wall(),
            carpentry: default_carpentry(),
            fixtures: default_fixtures(),
            furniture: default_furniture(),
            text: default_text(),
            editor_overlays: default_editor_overlays(),
        }
    }
}

impl LayerIds {
    /// Layers whose geometry defines the exported content box.
    pub fn content(&self) -> Vec<&str> {
        vec![
            self.room.as_str(),
            self.wall.as_str(),
            self.carpentry.as_str(),
            self.fixtures.as_str(),
            self.furniture.as_str(),
            self.text.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub include_scene: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String { "http://127.0.0.1:5055".to_string() }
fn default_api_path() -> String { "/api/v1/top2pano/generate".to_string() }
fn default_true() -> bool { true }
fn default_timeout_secs() -> u64 { 120 }

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_path: default_api_path(),
            enabled: true,
            include_scene: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InferenceConfig {
    pub fn endpoint(&self) -> String {
        let base = self.api_base.strip_suffix('/').unwrap_or(&self.api_base);
        format!("{}{}", base, self.api_path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Applies host overrides. Invocation is only disabled by an explicit
    /// false value; scene enrichment only enabled by an explicit true.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base) = lookup("TOP2PANO_MODEL_API_BASE").filter(|v| !v.is_empty()) {
            self.api_base = base;
        }
        if let Some(path) = lookup("TOP2PANO_MODEL_API_PATH").filter(|v| !v.is_empty()) {
            self.api_path = path;
        }
        if let Some(run) = lookup("TOP2PANO_RUN_LOCAL_MODEL") {
            if matches!(run.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off") {
                self.enabled = false;
            }
        }
        if let Some(scene) = lookup("TOP2PANO_MODEL_INCLUDE_SCENE") {
            if matches!(scene.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on") {
                self.include_scene = true;
            }
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = ExportConfig::default();
        assert_eq!(cfg.export_px, 1024);
        assert_eq!(cfg.padding, 60.0);
        assert!(cfg.inference.enabled);
        assert!(!cfg.inference.include_scene);
        assert_eq!(cfg.inference.endpoint(), "http://127.0.0.1:5055/api/v1/top2pano/generate");
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"exportPx": 512, "inference": {{"enabled": false}}}}"#).unwrap();

        let cfg = ExportConfig::load_from_file(file.path()).unwrap();
        assert_eq!(cfg.export_px, 512);
        assert_eq!(cfg.padding, 60.0);
        assert!(!cfg.inference.enabled);
        assert_eq!(cfg.inference.api_path, "/api/v1/top2pano/generate");
        assert_eq!(cfg.layers.wall, "boxwall");
    }

    #[test]
    fn test_endpoint_trims_one_slash() {
        let cfg = InferenceConfig { api_base: "http://host:1/".into(), ..Default::default() };
        assert_eq!(cfg.endpoint(), "http://host:1/api/v1/top2pano/generate");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TOP2PANO_MODEL_API_BASE", "http://10.0.0.2:9000"),
            ("TOP2PANO_RUN_LOCAL_MODEL", "false"),
            ("TOP2PANO_MODEL_INCLUDE_SCENE", "true"),
        ]
        .into_iter()
        .collect();
        let cfg = InferenceConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.api_base, "http://10.0.0.2:9000");
        assert!(!cfg.enabled);
        assert!(cfg.include_scene);

        // Anything but an explicit false keeps invocation on.
        let cfg = InferenceConfig::default().with_overrides(|k| {
            (k == "TOP2PANO_RUN_LOCAL_MODEL").then(|| "maybe".to_string())
        });
        assert!(cfg.enabled);
    }
}
