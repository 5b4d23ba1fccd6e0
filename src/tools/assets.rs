//! Image download tool.
//!
//! Downloaded images land in `<workspace>/assets` and are registered with the
//! agent as [`Asset`]s that the document can reference by id.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use super::{string_arg, Tool};

/// Largest image body accepted, in bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Status(reqwest::StatusCode),

    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Image too large (>5MB)")]
    TooLarge,

    #[error("Image conversion failed: {0}")]
    Convert(#[from] image::ImageError),

    #[error("Image conversion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Image formats the document writer can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    /// Stored as PNG after conversion.
    Webp,
}

impl ImageKind {
    pub fn stored_extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png | ImageKind::Webp => "png",
        }
    }
}

/// Map a `Content-Type` header value to a supported image kind.
pub fn classify_mime(content_type: &str) -> Result<ImageKind, FetchError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "image/jpeg" => Ok(ImageKind::Jpeg),
        "image/png" => Ok(ImageKind::Png),
        "image/webp" => Ok(ImageKind::Webp),
        _ => Err(FetchError::UnsupportedType(mime)),
    }
}

/// A downloaded image on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: String,
    /// Absolute path, so rendering does not depend on the working directory.
    pub path: PathBuf,
    pub source_url: String,
}

/// Download an image URL into the workspace.
pub struct FetchImage {
    client: reqwest::Client,
}

impl FetchImage {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; BlogAgent/1.0)")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Download `url` into `assets_dir`.
    pub async fn fetch(&self, url: &str, assets_dir: &Path) -> Result<Asset, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let kind = classify_mime(&content_type)?;

        if response
            .content_length()
            .is_some_and(|len| len > MAX_IMAGE_BYTES as u64)
        {
            return Err(FetchError::TooLarge);
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(FetchError::TooLarge);
        }

        store_image(&bytes, kind, url, assets_dir).await
    }
}

/// Write image bytes under a fresh asset id, converting WebP to PNG.
pub(crate) async fn store_image(
    bytes: &[u8],
    kind: ImageKind,
    source_url: &str,
    assets_dir: &Path,
) -> Result<Asset, FetchError> {
    tokio::fs::create_dir_all(assets_dir).await?;

    let simple = Uuid::new_v4().simple().to_string();
    let asset_id = format!("img_{}", &simple[..8]);
    let path = assets_dir.join(format!("{}.{}", asset_id, kind.stored_extension()));

    match kind {
        ImageKind::Webp => {
            let bytes = bytes.to_vec();
            let target = path.clone();
            tokio::task::spawn_blocking(move || -> Result<(), FetchError> {
                let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::WebP)?;
                decoded.to_rgb8().save_with_format(&target, ImageFormat::Png)?;
                Ok(())
            })
            .await??;
        }
        ImageKind::Jpeg | ImageKind::Png => tokio::fs::write(&path, bytes).await?,
    }

    let path = tokio::fs::canonicalize(&path).await?;
    tracing::info!("Saved asset {} from {}", asset_id, source_url);

    Ok(Asset {
        asset_id,
        path,
        source_url: source_url.to_string(),
    })
}

#[async_trait]
impl Tool for FetchImage {
    fn name(&self) -> &str {
        "fetch_image"
    }

    fn description(&self) -> &str {
        "Download an image URL (PNG/JPEG/WebP, max 5MB) to the assets folder. \
         Returns JSON {asset_id, path, source_url}."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The image URL to download"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<String> {
        let url =
            string_arg(&args).ok_or_else(|| anyhow::anyhow!("Missing 'url' argument"))?;
        let asset = self.fetch(&url, &workspace.join("assets")).await?;
        Ok(serde_json::to_string(&asset)?)
    }
}
