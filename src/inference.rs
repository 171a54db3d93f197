//! Inference Client - Hand-off to the Local Model Service
//!
//! Builds one multipart request from the export artifacts and dispatches
//! the response by content type. No retries at this layer.

use std::time::Duration;

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use thiserror::Error;

use crate::config::InferenceConfig;
use crate::meta::ExportMeta;
use crate::snapshot::SceneSnapshot;

pub const DEFAULT_ARCHIVE_NAME: &str = "top2pano_outputs.zip";
pub const DEFAULT_BINARY_NAME: &str = "top2pano_output.bin";

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model server unreachable: {0}")]
    Transport(String),

    #[error("Model server error HTTP {status}{}", fmt_body(.body))]
    Status { status: u16, body: String },

    #[error("Failed to encode request metadata: {0}")]
    Request(serde_json::Error),

    #[error("Malformed model server response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

fn fmt_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {}", body)
    }
}

impl InferenceError {
    pub fn status(&self) -> Option<u16> {
        match self {
            InferenceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        InferenceError::Transport(e.to_string())
    }
}

/// Everything that goes into the multipart body.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub size_px: u32,
    pub floorplan_png: Vec<u8>,
    pub wall_mask_png: Option<Vec<u8>>,
    pub meta_json: String,
    pub scene_json: Option<String>,
}

impl InferenceRequest {
    pub fn floorplan_filename(&self) -> String {
        format!("floorplan_{}.png", self.size_px)
    }

    pub fn wall_mask_filename(&self) -> String {
        format!("wall_mask_{}.png", self.size_px)
    }
}

/// Raw response as seen by the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Vec<u8>,
}

#[allow(async_fn_in_trait)]
pub trait InferenceTransport {
    async fn post_multipart(
        &self,
        endpoint: &str,
        request: InferenceRequest,
    ) -> Result<TransportResponse, InferenceError>;
}

/// `reqwest`-backed transport with a bounded request timeout.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, InferenceError> {
        Ok(Self { client: reqwest::Client::builder().timeout(timeout).build()? })
    }
}

impl InferenceTransport for HttpTransport {
    async fn post_multipart(
        &self,
        endpoint: &str,
        request: InferenceRequest,
    ) -> Result<TransportResponse, InferenceError> {
        let floorplan_name = request.floorplan_filename();
        let wall_mask_name = request.wall_mask_filename();

        let mut form = Form::new().part(
            "floorplan",
            Part::bytes(request.floorplan_png)
                .file_name(floorplan_name)
                .mime_str("image/png")?,
        );
        if let Some(mask) = request.wall_mask_png {
            form = form.part(
                "wall_mask",
                Part::bytes(mask).file_name(wall_mask_name).mime_str("image/png")?,
            );
        }
        form = form.text("meta", request.meta_json);
        if let Some(scene) = request.scene_json {
            form = form.text("scene", scene);
        }

        let response = self.client.post(endpoint).multipart(form).send().await?;
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let status = response.status().as_u16();
        let content_type = header(CONTENT_TYPE);
        let content_disposition = header(CONTENT_DISPOSITION);
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse { status, content_type, content_disposition, body })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InferenceResult {
    Zip { blob: Vec<u8>, filename: String },
    Json { payload: Value },
    Binary { blob: Vec<u8>, filename: String },
    Skipped,
}

impl InferenceResult {
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceResult::Zip { .. } => "zip",
            InferenceResult::Json { .. } => "json",
            InferenceResult::Binary { .. } => "file",
            InferenceResult::Skipped => "skipped",
        }
    }
}

pub struct InferenceClient<T> {
    config: InferenceConfig,
    transport: T,
}

impl<T: InferenceTransport> InferenceClient<T> {
    pub fn new(config: InferenceConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends the artifacts, or returns `Skipped` without any network
    /// activity when invocation is disabled.
    pub async fn run(
        &self,
        floorplan_png: &[u8],
        wall_mask_png: Option<&[u8]>,
        meta: &ExportMeta,
        snapshot: Option<&SceneSnapshot>,
    ) -> Result<InferenceResult, InferenceError> {
        if !self.config.enabled {
            log::info!("model invocation disabled");
            return Ok(InferenceResult::Skipped);
        }

        // Enrichment only: a snapshot that fails to serialize is dropped.
        let scene_json = match snapshot.filter(|_| self.config.include_scene) {
            Some(s) => match s.to_canonical_json() {
                Ok(json) => Some(json),
                Err(e) => {
                    log::warn!("scene snapshot dropped: {}", e);
                    None
                }
            },
            None => None,
        };

        let request = InferenceRequest {
            size_px: meta.export.size_px,
            floorplan_png: floorplan_png.to_vec(),
            wall_mask_png: wall_mask_png.map(<[u8]>::to_vec),
            meta_json: meta.to_json().map_err(InferenceError::Request)?,
            scene_json,
        };

        let endpoint = self.config.endpoint();
        log::info!("calling model server at {}", endpoint);
        let response = self.transport.post_multipart(&endpoint, request).await?;
        dispatch(response)
    }
}

/// Maps a raw response onto an `InferenceResult`.
pub fn dispatch(response: TransportResponse) -> Result<InferenceResult, InferenceError> {
    if !(200..300).contains(&response.status) {
        return Err(InferenceError::Status {
            status: response.status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        });
    }

    let content_type = response.content_type.as_deref().unwrap_or("").to_ascii_lowercase();
    if content_type.contains("application/zip") || content_type.contains("application/octet-stream") {
        let filename = response
            .content_disposition
            .as_deref()
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string());
        return Ok(InferenceResult::Zip { blob: response.body, filename });
    }

    if content_type.contains("application/json") {
        let payload = serde_json::from_slice(&response.body)?;
        return Ok(InferenceResult::Json { payload });
    }

    Ok(InferenceResult::Binary { blob: response.body, filename: DEFAULT_BINARY_NAME.to_string() })
}

/// Extracts the first `filename` / `filename*` value of a
/// Content-Disposition header, percent-decoded and unquoted.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let lower = header.to_ascii_lowercase();
    let start = lower.find("filename")?;
    let mut rest = &header[start + "filename".len()..];

    rest = rest.strip_prefix('*').unwrap_or(rest);
    rest = rest.strip_prefix('=')?;
    if rest.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("UTF-8''")) {
        rest = &rest[7..];
    } else if let Some(unquoted) = rest.strip_prefix('"') {
        rest = unquoted;
    }

    let end = rest.find(['"', ';', '\n']).unwrap_or(rest.len());
    let raw = &rest[..end];
    if raw.is_empty() {
        return None;
    }
    Some(percent_decode(raw).replace('"', ""))
}

fn percent_decode(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
