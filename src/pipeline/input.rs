//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! pdfium loads documents from a byte slice, so both local files and
//! downloads end up in memory. The `%PDF` magic is checked here so callers
//! get [`TranslateError::NotAPdf`] rather than a pdfium parse error.

use crate::error::TranslateError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL, then validate the PDF magic.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, TranslateError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_magic(input, &bytes)?;
    Ok(bytes)
}

/// Fail with [`TranslateError::NotAPdf`] unless `bytes` starts with `%PDF`.
pub fn check_magic(input: &str, bytes: &[u8]) -> Result<(), TranslateError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    for (dst, src) in magic.iter_mut().zip(bytes) {
        *dst = *src;
    }
    Err(TranslateError::NotAPdf {
        input: input.to_string(),
        magic,
    })
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, TranslateError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(TranslateError::PermissionDenied { path })
        }
        Err(_) => Err(TranslateError::FileNotFound { path }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, TranslateError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| TranslateError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TranslateError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
