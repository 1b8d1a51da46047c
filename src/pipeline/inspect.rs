//! PDF collaborators: page counting and embedded-image extraction.
//!
//! Both are best-effort. The orchestrator treats a page-count failure as
//! "0 pages" (coarser progress) and an image-extraction failure as "no
//! images" (no hint block in the prompt); neither stops a conversion.
//!
//! pdfium wraps a C++ library with thread-local state, so all calls run in
//! `tokio::task::spawn_blocking`.

use crate::error::BookError;
use crate::output::ImageRef;
use crate::pipeline::encode;
use crate::pipeline::input::SourceFile;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Images smaller than this on both sides are treated as decoration.
const MIN_IMAGE_SIDE: u32 = 16;

/// Structural facts about a source PDF.
#[async_trait]
pub trait DocumentInspector: Send + Sync {
    /// Number of pages in the document.
    async fn page_count(&self, source: &SourceFile) -> Result<usize, BookError>;

    /// Embedded images in page order.
    async fn extract_images(&self, source: &SourceFile) -> Result<Vec<ImageRef>, BookError>;
}

/// [`DocumentInspector`] backed by pdfium.
///
/// With an asset directory, images are written there as PNG files and
/// referenced by path; without one they are inlined as `data:` URLs.
#[derive(Debug, Clone, Default)]
pub struct PdfiumInspector {
    asset_dir: Option<PathBuf>,
}

impl PdfiumInspector {
    pub fn new(asset_dir: Option<PathBuf>) -> Self {
        Self { asset_dir }
    }
}

#[async_trait]
impl DocumentInspector for PdfiumInspector {
    async fn page_count(&self, source: &SourceFile) -> Result<usize, BookError> {
        let path = source.path().to_path_buf();
        tokio::task::spawn_blocking(move || page_count_blocking(&path))
            .await
            .map_err(|e| BookError::PageCountFailure(format!("task panicked: {e}")))?
    }

    async fn extract_images(&self, source: &SourceFile) -> Result<Vec<ImageRef>, BookError> {
        let path = source.path().to_path_buf();
        let target = self
            .asset_dir
            .as_ref()
            .map(|dir| dir.join(asset_folder_name(&source.stem())));
        tokio::task::spawn_blocking(move || extract_images_blocking(&path, target.as_deref()))
            .await
            .map_err(|e| BookError::ImageExtractionFailure(format!("task panicked: {e}")))?
    }
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system.
pub fn bind_pdfium() -> Result<Pdfium, BookError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => {
            let path = PathBuf::from(p);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(lib)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| BookError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn load<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, BookError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| BookError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

fn page_count_blocking(path: &Path) -> Result<usize, BookError> {
    let pdfium = bind_pdfium().map_err(|e| BookError::PageCountFailure(e.to_string()))?;
    let document = load(&pdfium, path)?;
    let count = document.pages().len() as usize;
    debug!("{}: {} pages", path.display(), count);
    Ok(count)
}

fn extract_images_blocking(path: &Path, target: Option<&Path>) -> Result<Vec<ImageRef>, BookError> {
    let fail = |detail: String| BookError::ImageExtractionFailure(detail);

    let pdfium = bind_pdfium().map_err(|e| fail(e.to_string()))?;
    let document = load(&pdfium, path)?;

    if let Some(dir) = target {
        std::fs::create_dir_all(dir).map_err(|e| fail(format!("{}: {e}", dir.display())))?;
    }

    let mut images = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let page_num = index + 1;
        let mut on_page = 0usize;

        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            let raw = match image_object.get_raw_image() {
                Ok(img) => img,
                Err(e) => {
                    warn!("Page {}: unreadable image object: {:?}", page_num, e);
                    continue;
                }
            };
            if raw.width() < MIN_IMAGE_SIDE && raw.height() < MIN_IMAGE_SIDE {
                continue;
            }
            let png = encode::encode_png(&raw).map_err(|e| fail(e.to_string()))?;
            on_page += 1;

            let url = match target {
                Some(dir) => {
                    let file = dir.join(format!("page-{page_num}-{on_page}.png"));
                    std::fs::write(&file, &png)
                        .map_err(|e| fail(format!("{}: {e}", file.display())))?;
                    file.display().to_string()
                }
                None => encode::png_data_url(&png),
            };
            images.push(ImageRef { page: page_num, url });
        }
    }

    info!("Extracted {} images from {}", images.len(), path.display());
    Ok(images)
}

/// Filesystem-safe, collision-free folder name for one conversion's assets.
fn asset_folder_name(stem: &str) -> String {
    let slug: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug = if slug.is_empty() { "book".to_string() } else { slug };
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", slug, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_folder_is_slugged_and_unique() {
        let a = asset_folder_name("My Great  Book!");
        let b = asset_folder_name("My Great  Book!");
        assert!(a.starts_with("my-great-book-"), "got {a}");
        assert_eq!(a.len(), "my-great-book-".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn asset_folder_for_symbol_only_stem() {
        assert!(asset_folder_name("???").starts_with("book-"));
    }
}
