//! Input resolution: turn a path, URL or byte buffer into a [`SourceFile`].
//!
//! pdfium needs a file-system path while the model needs the raw bytes, so a
//! resolved source carries both. URL downloads land in a `TempDir` that is
//! removed when the `SourceFile` is dropped. The PDF magic bytes (`%PDF`) are
//! checked up front so callers get a meaningful error instead of a model
//! trying to read garbage.

use crate::error::BookError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

/// Keeps temporary storage alive for as long as the source is in use.
enum Backing {
    Local,
    Downloaded(#[allow(dead_code)] TempDir),
    Buffer(#[allow(dead_code)] NamedTempFile),
}

/// A PDF ready for the pipeline.
pub struct SourceFile {
    path: PathBuf,
    name: String,
    bytes: Vec<u8>,
    _backing: Backing,
}

impl SourceFile {
    /// Path pdfium can open.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name, e.g. `report.pdf`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name without extension; the fallback book title.
    pub fn stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP(S) URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceFile, BookError> {
    if input.trim().is_empty() {
        return Err(BookError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

/// Wrap an in-memory PDF. The bytes are also written to a managed temp file
/// so pdfium can open them.
pub fn from_bytes(bytes: Vec<u8>, name: &str) -> Result<SourceFile, BookError> {
    check_magic(&bytes, Path::new(name))?;
    let mut tmp =
        NamedTempFile::new().map_err(|e| BookError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(&bytes)
        .map_err(|e| BookError::Internal(format!("tempfile write: {e}")))?;
    Ok(SourceFile {
        path: tmp.path().to_path_buf(),
        name: name.to_string(),
        bytes,
        _backing: Backing::Buffer(tmp),
    })
}

async fn resolve_local(path_str: &str) -> Result<SourceFile, BookError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(BookError::FileNotFound { path });
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(BookError::PermissionDenied { path });
        }
        Err(_) => return Err(BookError::FileNotFound { path }),
    };
    check_magic(&bytes, &path)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_str.to_string());

    debug!("Resolved local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceFile {
        path,
        name,
        bytes,
        _backing: Backing::Local,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceFile, BookError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BookError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            BookError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BookError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(BookError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| BookError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    let temp_dir = TempDir::new().map_err(|e| BookError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);
    check_magic(&bytes, &file_path)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| BookError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(SourceFile {
        path: file_path,
        name: filename,
        bytes,
        _backing: Backing::Downloaded(temp_dir),
    })
}

fn check_magic(bytes: &[u8], path: &Path) -> Result<(), BookError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(BookError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Last path segment of a URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}
