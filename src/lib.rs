//! # pdf2book
//!
//! Turn a PDF into a mobile-readable book: short pages of 300–400 words,
//! grouped into chapters, stored in a local library.
//!
//! ## Why two phases?
//!
//! A single "read this PDF and paginate it" request fails on real books:
//! the answer is too long to fit one response and gets cut off mid-JSON,
//! and the model paginates badly when it also has to read layout. So the
//! work is split:
//!
//! 1. **Extract** — one streamed multimodal request returns the raw text
//!    with headings and images kept. Truncated output is repaired by a
//!    resilient JSON decoder.
//! 2. **Refine** — the raw text is chunked on headings and blank lines and
//!    each chunk is reflowed into pages by its own request. A chunk that
//!    fails is kept verbatim instead of failing the book.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file, URL or byte buffer
//!  ├─ 2. Inspect  page count + embedded images via pdfium (best-effort)
//!  ├─ 3. Extract  streamed request → raw document          5 → 60 %
//!  ├─ 4. Chunk    split on headings / blank lines (15 000 chars)
//!  ├─ 5. Refine   one request per chunk → numbered pages   60 → 100 %
//!  └─ 6. Store    library (JSON) / export (Markdown)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2book::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Backend auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ConversionConfig::default();
//!     let output = convert("novel.pdf", &config).await?;
//!     println!("{}: {} pages", output.document.title, output.document.pages.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2book` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2book = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Backend
//!
//! Gemini is preferred: it reads the PDF natively and enforces the JSON
//! schema server-side. Any edgequake-llm provider works as well; the PDF is
//! sent as an attachment and the schema is described in the prompt.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod library;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod queue;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, PageSeparator};
pub use convert::{
    convert, convert_from_bytes, convert_source, convert_sync, convert_to_library, inspect,
    resolve_model,
};
pub use error::{BookError, ChunkError};
pub use export::{export_to_file, to_markdown, ExportOptions};
pub use library::{Library, StoredBook};
pub use model::{GenerativeModel, ModelRequest, ModelResponse};
pub use output::{ConversionOutput, ConversionStats, Document, ImageRef, Page, SourceInfo};
pub use pipeline::inspect::DocumentInspector;
pub use pipeline::refine::FALLBACK_CHAPTER_TITLE;
pub use progress::{BookProgressCallback, NoopProgressCallback, ProgressCallback};
pub use queue::{BookQueue, Job, JobStatus};
