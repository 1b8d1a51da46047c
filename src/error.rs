//! Error types for the pdf2book library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BookError`] — **Fatal**: the conversion cannot proceed (bad input
//!   file, provider not configured, Phase-1 output could not be decoded).
//!   Returned as `Err(BookError)` from the top-level `convert*` functions.
//!
//! * [`ChunkError`] — **Non-fatal**: one Phase-2 refinement request failed.
//!   The chunk is kept verbatim as a fallback page and the error is recorded
//!   in [`crate::output::ConversionStats`] so callers can see which parts of
//!   the book were not reflowed.
//!
//! Image-extraction and page-count failures are also non-fatal; they have
//! variants here so the collaborators can report them, but the orchestrator
//! never lets them escape.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2book library.
#[derive(Debug, Error)]
pub enum BookError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF collaborator errors ───────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    /// Page counting failed. Degrades progress granularity only.
    #[error("Page count unavailable: {0}")]
    PageCountFailure(String),

    /// Embedded image extraction failed. Only the prompt hint is lost.
    #[error("Image extraction failed: {0}")]
    ImageExtractionFailure(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call failed or produced no text.
    #[error("Model request failed: {0}")]
    UpstreamFailure(String),

    /// Model output could not be decoded, even after truncation repair.
    #[error("Model returned malformed JSON: {0}")]
    MalformedOutput(String),

    // ── Library errors ────────────────────────────────────────────────────
    /// No stored book has this id.
    #[error("No book with id '{id}' in the library")]
    BookNotFound { id: String },

    /// Reading or writing the library directory failed.
    #[error("Library storage error at '{path}': {source}")]
    StorageFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored book file exists but is not valid JSON.
    #[error("Stored book '{path}' is unreadable: {detail}")]
    CorruptBook { path: PathBuf, detail: String },

    /// Could not create or write an exported file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure while refining one Phase-2 chunk.
///
/// The chunk's text is preserved verbatim in the output; this value only
/// records why it was not reflowed.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ChunkError {
    /// The model request failed or returned nothing.
    #[error("Chunk {chunk}: model request failed: {detail}")]
    RequestFailed { chunk: usize, detail: String },

    /// The response could not be decoded into pages.
    #[error("Chunk {chunk}: malformed response: {detail}")]
    Malformed { chunk: usize, detail: String },

    /// The response decoded but contained no pages.
    #[error("Chunk {chunk}: model returned no pages")]
    Empty { chunk: usize },
}

impl ChunkError {
    /// Classify a fatal-looking error as a per-chunk failure.
    pub fn from_book_error(chunk: usize, err: BookError) -> Self {
        match err {
            BookError::MalformedOutput(detail) => ChunkError::Malformed { chunk, detail },
            other => ChunkError::RequestFailed {
                chunk,
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_output_display() {
        let e = BookError::MalformedOutput("EOF while parsing".into());
        assert!(e.to_string().contains("EOF while parsing"));
    }

    #[test]
    fn book_not_found_display() {
        let e = BookError::BookNotFound { id: "abc".into() };
        assert!(e.to_string().contains("abc"));
    }

    #[test]
    fn chunk_error_classifies_malformed() {
        let e = ChunkError::from_book_error(2, BookError::MalformedOutput("bad".into()));
        assert!(matches!(e, ChunkError::Malformed { chunk: 2, .. }));
    }

    #[test]
    fn chunk_error_classifies_upstream() {
        let e = ChunkError::from_book_error(4, BookError::UpstreamFailure("503".into()));
        match e {
            ChunkError::RequestFailed { chunk, detail } => {
                assert_eq!(chunk, 4);
                assert!(detail.contains("503"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
