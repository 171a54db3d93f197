//! Export metadata sent alongside the rasters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Viewport;

pub const META_SCHEMA_VERSION: u32 = 1;
pub const EDITOR_NAME: &str = "top2pano-editor";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMeta {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub editor: EditorInfo,
    pub export: ExportGeometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportGeometry {
    pub size_px: u32,
    pub view_box: Viewport,
    pub meter_units_per_meter: f64,
    /// Pixels per metre in the exported raster.
    pub pixel_scale: f64,
}

pub fn compute_pixel_scale(export_px: u32, view_box_w: f64, units_per_meter: f64) -> f64 {
    export_px as f64 / view_box_w * units_per_meter
}

impl ExportMeta {
    pub fn build(export_px: u32, viewport: Viewport, units_per_meter: f64) -> Self {
        Self::build_at(export_px, viewport, units_per_meter, Utc::now())
    }

    pub fn build_at(export_px: u32, viewport: Viewport, units_per_meter: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: META_SCHEMA_VERSION,
            created_at,
            editor: EditorInfo { name: EDITOR_NAME.to_string() },
            export: ExportGeometry {
                size_px: export_px,
                view_box: viewport,
                meter_units_per_meter: units_per_meter,
                pixel_scale: compute_pixel_scale(export_px, viewport.w, units_per_meter),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn test_pixel_scale() {
        assert_eq!(compute_pixel_scale(1024, 320.0, 60.0), 192.0);
        assert_eq!(compute_pixel_scale(1024, 1024.0, 100.0), 100.0);
    }

    #[test]
    fn test_wire_shape() {
        let meta = ExportMeta::build(1024, Rect::new(-60.0, -10.0, 320.0, 320.0), 60.0);
        let v: serde_json::Value = serde_json::from_str(&meta.to_json().unwrap()).unwrap();
        assert_eq!(v["schemaVersion"], 1);
        assert_eq!(v["editor"]["name"], "top2pano-editor");
        assert_eq!(v["export"]["sizePx"], 1024);
        assert_eq!(v["export"]["viewBox"]["x"], -60.0);
        assert_eq!(v["export"]["viewBox"]["w"], 320.0);
        assert_eq!(v["export"]["meterUnitsPerMeter"], 60.0);
        assert_eq!(v["export"]["pixelScale"], 192.0);
        assert!(v["createdAt"].is_string());
    }
}
