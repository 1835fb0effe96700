//! Plain URL downloads.

use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::util::errors::MixDownError;
use crate::util::hash::short_hash;

/// Deterministic file name for a URL: its last non-empty path segment, or
/// `download-<hash>` when it has none.
pub fn url_to_filename(url: &str) -> String {
    let segment = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
    });

    if let Some(segment) = segment {
        let sanitized: String = segment
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '+' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized != "." && sanitized != ".." {
            return sanitized;
        }
    }

    format!("download-{}", short_hash(url, 16))
}

/// Download `url` into `download_dir`, creating it if needed, and return
/// the path of the downloaded file.
pub fn download(url: &str, download_dir: &Path) -> Result<PathBuf, MixDownError> {
    let failed = |message: String| MixDownError::DownloadFailed {
        url: url.to_string(),
        message,
    };

    fs::create_dir_all(download_dir).map_err(|e| MixDownError::io(download_dir, e))?;
    let dest = download_dir.join(url_to_filename(url));

    let parsed = Url::parse(url).map_err(|e| failed(e.to_string()))?;
    if parsed.scheme() == "file" {
        let source = parsed
            .to_file_path()
            .map_err(|_| failed("not a local file path".to_string()))?;
        fs::copy(&source, &dest).map_err(|e| failed(format!("{}: {}", source.display(), e)))?;
        tracing::debug!("copied {} to {}", source.display(), dest.display());
        return Ok(dest);
    }

    tracing::info!("Downloading {}", url);
    let response = reqwest::blocking::get(url).map_err(|e| failed(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    let bytes = response.bytes().map_err(|e| failed(e.to_string()))?;

    fs::write(&dest, &bytes).map_err(|e| MixDownError::io(&dest, e))?;
    tracing::debug!("downloaded {} bytes to {}", bytes.len(), dest.display());

    Ok(dest)
}
