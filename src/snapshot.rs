//! Scene Snapshot - Typed, Versioned Editor State
//!
//! Optional enrichment for the inference request. The editor hands over
//! walls, placed objects and rooms; unknown schema versions are rejected
//! at the boundary and counts are always recomputed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::hashing::canonical_json;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Editor runtime fields that are heavy or not serializable.
const RUNTIME_KEYS: &[&str] = &["graph", "bbox", "realBbox"];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Invalid scene snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported scene snapshot schema version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WallSegment {
    #[serde(default)]
    pub start: Option<Point>,
    #[serde(default)]
    pub end: Option<Point>,
    #[serde(default)]
    pub thick: Option<f64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedObject {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub angle: Option<f64>,
    #[serde(default)]
    pub angle_sign: Option<f64>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub thick: Option<f64>,
    /// Free-form payload (furniture source, label, aspect lock).
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPolygon {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub surface: Option<Value>,
    #[serde(default)]
    pub show_surface: Option<bool>,
    #[serde(default)]
    pub coords: Option<Vec<Point>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCounts {
    pub walls: usize,
    pub objects: usize,
    pub rooms: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub schema_version: u32,
    #[serde(default)]
    pub walls: Vec<WallSegment>,
    #[serde(default)]
    pub objects: Vec<PlacedObject>,
    #[serde(default)]
    pub rooms: Vec<RoomPolygon>,
    #[serde(default)]
    pub counts: SnapshotCounts,
}

impl SceneSnapshot {
    pub fn new(walls: Vec<WallSegment>, objects: Vec<PlacedObject>, rooms: Vec<RoomPolygon>) -> Self {
        let mut snapshot = Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            walls,
            objects,
            rooms,
            counts: SnapshotCounts::default(),
        };
        snapshot.normalize();
        snapshot
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let mut snapshot: Self = serde_json::from_str(json)?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.schema_version));
        }
        snapshot.normalize();
        Ok(snapshot)
    }

    /// Sorted-key JSON so equal snapshots always serialize identically.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        canonical_json(self)
    }

    fn normalize(&mut self) {
        for object in &mut self.objects {
            if let Some(value) = object.value.as_mut() {
                strip_runtime_keys(value);
            }
        }
        self.counts = SnapshotCounts {
            walls: self.walls.len(),
            objects: self.objects.len(),
            rooms: self.rooms.len(),
        };
    }
}

fn strip_runtime_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|k, _| !RUNTIME_KEYS.contains(&k.as_str()));
            map.values_mut().for_each(strip_runtime_keys);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_runtime_keys),
        _ => {}
    }
}
