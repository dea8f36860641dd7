//! Layout-model weight cache.
//!
//! Weights are fetched once, on first initialisation, into a per-user cache
//! directory and reused by every later run:
//!
//! - **Linux**: `~/.cache/pdf-translate/layout-models/`
//! - **macOS**: `~/Library/Caches/pdf-translate/layout-models/`
//! - **Windows**: `%LOCALAPPDATA%\pdf-translate\layout-models\`
//!
//! Override with `PDF_TRANSLATE_MODEL_CACHE` or [`LearnedLayoutParams::cache_dir`].
//! Downloads stream into a `.part` file that is renamed on success, so an
//! interrupted download is never mistaken for a cached model.

use crate::config::LearnedLayoutParams;
use crate::error::LayoutModelError;
use futures::StreamExt;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Serialises downloads within a process; the existence check is repeated
/// under the lock.
static DOWNLOAD_LOCK: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// Location and source of one model's weights.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAssets {
    pub cache_dir: PathBuf,
    pub file_name: String,
    pub url: Option<String>,
}

impl ModelAssets {
    pub fn from_params(params: &LearnedLayoutParams) -> Self {
        Self {
            cache_dir: params
                .cache_dir
                .clone()
                .unwrap_or_else(default_cache_dir),
            file_name: params.weights_file.clone(),
            url: params.weights_url.clone(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(&self.file_name)
    }

    pub fn is_cached(&self) -> bool {
        self.path().is_file()
    }

    /// Make sure the weights are on disk.
    ///
    /// Returns the weights path, or `None` when no URL is configured and
    /// nothing is cached (the model command is then run without `--weights`).
    pub async fn ensure(&self) -> Result<Option<PathBuf>, LayoutModelError> {
        let path = self.path();
        if path.is_file() {
            debug!("Layout model weights cached at {}", path.display());
            return Ok(Some(path));
        }
        let Some(url) = &self.url else {
            return Ok(None);
        };

        let _guard = DOWNLOAD_LOCK.lock().await;
        if path.is_file() {
            return Ok(Some(path));
        }

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| {
                LayoutModelError::Unavailable(format!(
                    "create cache dir {}: {e}",
                    self.cache_dir.display()
                ))
            })?;

        info!("Downloading layout model weights from {}", url);
        let bytes = download(url, &path).await?;
        info!("Layout model weights saved ({} bytes) → {}", bytes, path.display());
        Ok(Some(path))
    }
}

/// Default cache directory for layout-model weights.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PDF_TRANSLATE_MODEL_CACHE") {
        return PathBuf::from(dir);
    }
    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("pdf-translate").join("layout-models")
}

async fn download(url: &str, dest: &Path) -> Result<u64, LayoutModelError> {
    let fail = |reason: String| LayoutModelError::Unavailable(format!("download {url}: {reason}"));

    let client = reqwest::Client::builder()
        .user_agent(concat!("pdf-translate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| fail(e.to_string()))?;
    let response = client.get(url).send().await.map_err(|e| fail(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fail(format!("HTTP {}", response.status())));
    }

    let part = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&part)
        .await
        .map_err(|e| fail(e.to_string()))?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| fail(e.to_string()))?;
        file.write_all(&chunk).await.map_err(|e| fail(e.to_string()))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| fail(e.to_string()))?;
    drop(file);

    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| fail(e.to_string()))?;
    Ok(written)
}
