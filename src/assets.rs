//! Asset Inliner - Self-Contained Image References
//!
//! Rasterization never touches the network or the filesystem: every
//! `<image>` in a sanitized clone is rewritten to a `data:` URI first.
//! Images that cannot be resolved are hidden instead of rendering as a
//! broken placeholder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clone::SanitizedScene;
use crate::document::Element;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Failed to fetch {href}: {message}")]
    Fetch { href: String, message: String },

    #[error("Unrecognised image data for {0}")]
    UnknownFormat(String),
}

/// Source of image bytes for non-embedded references.
#[allow(async_fn_in_trait)]
pub trait AssetFetcher {
    async fn fetch(&self, href: &str) -> Result<Vec<u8>, AssetError>;
}

/// Resolves `http(s)` through an HTTP client and everything else as a
/// path relative to `base_dir`.
pub struct ResourceFetcher {
    base_dir: PathBuf,
    http: reqwest::Client,
}

impl ResourceFetcher {
    pub fn new(base_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_dir: base_dir.into(),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn resolve(&self, href: &str) -> PathBuf {
        let raw = href.strip_prefix("file://").unwrap_or(href);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl AssetFetcher for ResourceFetcher {
    async fn fetch(&self, href: &str) -> Result<Vec<u8>, AssetError> {
        let fail = |message: String| AssetError::Fetch { href: href.to_string(), message };

        if href.starts_with("http://") || href.starts_with("https://") {
            let response = self
                .http
                .get(href)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| fail(e.to_string()))?;
            let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
            return Ok(bytes.to_vec());
        }

        tokio::fs::read(self.resolve(href))
            .await
            .map_err(|e| fail(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineSummary {
    pub embedded: usize,
    pub already_embedded: usize,
    pub ephemeral: usize,
    pub hidden: usize,
}

enum Reference {
    Embedded,
    Ephemeral,
    Fetchable(String),
}

fn classify(href: &str) -> Reference {
    let lower = href.trim_start().to_ascii_lowercase();
    if lower.starts_with("data:") {
        Reference::Embedded
    } else if lower.starts_with("blob:") {
        Reference::Ephemeral
    } else {
        Reference::Fetchable(href.trim().to_string())
    }
}

fn href_of(image: &Element) -> Option<(&'static str, &str)> {
    image
        .attr("href")
        .map(|v| ("href", v))
        .or_else(|| image.attr("xlink:href").map(|v| ("xlink:href", v)))
}

/// Rewrites every image reference of `scene` in place.
pub async fn inline_assets<F: AssetFetcher>(scene: &mut SanitizedScene, fetcher: &F) -> InlineSummary {
    let mut summary = InlineSummary::default();
    let root = scene.document.root_mut();

    for path in root.paths_of("image") {
        let Some((attr, href)) = root.at_path(&path).and_then(href_of) else {
            continue;
        };
        let href = match classify(href) {
            Reference::Embedded => {
                summary.already_embedded += 1;
                continue;
            }
            Reference::Ephemeral => {
                summary.ephemeral += 1;
                continue;
            }
            Reference::Fetchable(href) => href,
        };

        let resolved = match fetcher.fetch(&href).await {
            Ok(bytes) => to_data_uri(&href, &bytes),
            Err(e) => Err(e),
        };

        let Some(image) = root.at_path_mut(&path) else {
            continue;
        };
        match resolved {
            Ok(uri) => {
                image.set_attr(attr, uri);
                summary.embedded += 1;
            }
            Err(e) => {
                log::warn!("hiding image: {}", e);
                image.set_attr("display", "none");
                summary.hidden += 1;
            }
        }
    }

    log::debug!("{:?} clone assets: {:?}", scene.purpose, summary);
    summary
}

/// Encodes image bytes as a base64 `data:` URI, sniffing the MIME type.
pub fn to_data_uri(href: &str, bytes: &[u8]) -> Result<String, AssetError> {
    let mime = sniff_mime(bytes).ok_or_else(|| AssetError::UnknownFormat(href.to_string()))?;
    Ok(format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return match format {
            image::ImageFormat::Png => Some("image/png"),
            image::ImageFormat::Jpeg => Some("image/jpeg"),
            image::ImageFormat::Gif => Some("image/gif"),
            image::ImageFormat::WebP => Some("image/webp"),
            image::ImageFormat::Bmp => Some("image/bmp"),
            _ => None,
        };
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        Some("image/svg+xml")
    } else {
        None
    }
}
