//! Pipeline stages for PDF-to-book conversion.
//!
//! Each submodule implements one step; the orchestrator in
//! [`crate::convert`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ inspect ──▶ extract ──▶ clean ──▶ chunk ──▶ refine ──▶ Document
//! (path/URL)  (pdfium)   (Phase 1,            (soft      (Phase 2,
//!                         streamed)            ceiling)   per chunk)
//!                              └──── json (truncation repair) ────┘
//! ```
//!
//! 1. [`input`]   — canonicalise a path, URL or byte buffer into a source file
//! 2. [`inspect`] — page count and embedded images (best-effort)
//! 3. [`extract`] — one streamed multimodal request for the raw structure
//! 4. [`clean`]   — whitespace and invisible-character hygiene
//! 5. [`chunk`]   — split the raw text on headings and blank lines
//! 6. [`refine`]  — one structured request per chunk, verbatim fallback
//! 7. [`json`]    — decoder shared by both phases
//! 8. [`encode`]  — base64 / PNG helpers for attachments and images
//! 9. [`images`]  — short aliases for inline image URLs in prompts

pub mod chunk;
pub mod clean;
pub mod encode;
pub mod extract;
pub mod images;
pub mod input;
pub mod inspect;
pub mod json;
pub mod refine;
